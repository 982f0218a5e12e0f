//! End-to-end CLI tests against a server tree on disk

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn server_tree(temp: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    let dir = temp.path().join("wlp/usr/servers/defaultServer");
    fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir.join("server.xml")
}

fn libertycfg() -> Command {
    Command::cargo_bin("libertycfg").unwrap()
}

#[test]
fn flatten_inlines_includes() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server><include location="extra.xml"/></server>"#,
            ),
            ("extra.xml", r#"<server><library id="L1"/></server>"#),
        ],
    );

    libertycfg()
        .arg("flatten")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"<library id="L1"/>"#))
        .stdout(predicate::str::contains("Begin include: extra.xml"));
}

#[test]
fn vars_json_lists_effective_variables() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server><variable name="httpPort" value="9080"/></server>"#,
            ),
            ("bootstrap.properties", "from.bootstrap=yes\n"),
        ],
    );

    libertycfg()
        .arg("vars")
        .arg(&root)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "httpPort""#))
        .stdout(predicate::str::contains(r#""var_type": "short""#))
        .stdout(predicate::str::contains("from.bootstrap"))
        .stdout(predicate::str::contains("wlp.server.name"));
}

#[test]
fn resolve_expands_references_and_arithmetic() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[(
            "server.xml",
            r#"<server><variable name="httpPort" value="9080"/></server>"#,
        )],
    );

    libertycfg()
        .arg("resolve")
        .arg(&root)
        .arg("${httpPort}+1")
        .assert()
        .success()
        .stdout(predicate::str::contains("9081"));
}

#[test]
fn resolve_fails_on_undefined_reference() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(&temp, &[("server.xml", "<server/>")]);

    libertycfg()
        .arg("resolve")
        .arg(&root)
        .arg("${nothing.here}")
        .assert()
        .failure()
        .stdout(predicate::str::contains("${nothing.here}"))
        .stderr(predicate::str::contains("undefined variable: nothing.here"));
}

#[test]
fn validate_reports_plaintext_password_and_missing_include() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[(
            "server.xml",
            r#"<server>
                <include location="absent.xml"/>
                <dataSource id="db">
                    <properties password="hunter2"/>
                </dataSource>
            </server>"#,
        )],
    );

    libertycfg()
        .arg("validate")
        .arg(&root)
        .assert()
        .failure()
        .stdout(predicate::str::contains("unresolved include"))
        .stdout(predicate::str::contains("plain text password"));
}

#[test]
fn validate_clean_tree_succeeds() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[(
            "server.xml",
            r#"<server>
                <dataSource id="db">
                    <properties password="{xor}Lz4sLCgwLTs="/>
                </dataSource>
            </server>"#,
        )],
    );

    libertycfg()
        .arg("validate")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("no findings"));
}

#[test]
fn files_walks_the_graph() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server><include location="a.xml"/></server>"#,
            ),
            ("a.xml", "<server/>"),
            ("configDropins/overrides/z.xml", "<server/>"),
        ],
    );

    libertycfg()
        .arg("files")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("server.xml"))
        .stdout(predicate::str::contains("a.xml"))
        .stdout(predicate::str::contains("z.xml"));
}
