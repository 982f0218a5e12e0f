//! Integration tests for end-to-end configuration resolution: merge
//! semantics across includes and dropins, variable collection, and
//! reference resolution against a full server tree on disk.

use libertycfg_core::bootstrap;
use libertycfg_core::merge::{MergeEngine, collect_variables, flatten};
use libertycfg_core::registry::DocumentRegistry;
use libertycfg_core::server::ServerLayout;
use libertycfg_core::variables::{self, VariableLookup, VariableStore, VariableType};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Lay out `<wlp>/usr/servers/<name>/` with the given files (paths
/// relative to the server directory) and return the server.xml path.
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

#[test]
fn test_merge_unions_filesets_across_files() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <library id="shared">
                        <fileset dir="a" includes="*.jar"/>
                    </library>
                    <include location="more.xml"/>
                </server>"#,
            ),
            (
                "more.xml",
                r#"<server>
                    <library id="shared">
                        <fileset dir="b" includes="*.jar"/>
                    </library>
                </server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    let libraries = engine.resolve_elements(&root, "library", "id").unwrap();
    assert_eq!(libraries.len(), 1);
    let dirs: Vec<&str> = libraries[0]
        .children_named("fileset")
        .filter_map(|f| f.attribute("dir"))
        .collect();
    assert_eq!(dirs, vec!["a", "b"]);
}

#[test]
fn test_replace_include_discards_earlier_element() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <dataSource id="db" jndiName="jdbc/old" connectionManagerRef="cm1"/>
                    <include location="ds.xml" onConflict="replace"/>
                </server>"#,
            ),
            (
                "ds.xml",
                r#"<server>
                    <dataSource id="db" jndiName="jdbc/new"/>
                </server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    let sources = engine.resolve_elements(&root, "dataSource", "id").unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].attribute("jndiName"), Some("jdbc/new"));
    // Replace drops attributes the replacement does not carry
    assert_eq!(sources[0].attribute("connectionManagerRef"), None);
}

#[test]
fn test_dropin_precedence_order() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <httpEndpoint id="e" httpPort="2" host="fromRoot"/>
                </server>"#,
            ),
            (
                "configDropins/defaults/a.xml",
                r#"<server>
                    <httpEndpoint id="e" httpPort="1" httpsPort="9443"/>
                </server>"#,
            ),
            (
                "configDropins/overrides/z.xml",
                r#"<server>
                    <httpEndpoint id="e" httpPort="3"/>
                </server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    let endpoints = engine.resolve_elements(&root, "httpEndpoint", "id").unwrap();
    assert_eq!(endpoints.len(), 1);
    // Root beats defaults, overrides beat root, untouched attributes survive
    assert_eq!(endpoints[0].attribute("httpPort"), Some("3"));
    assert_eq!(endpoints[0].attribute("host"), Some("fromRoot"));
    assert_eq!(endpoints[0].attribute("httpsPort"), Some("9443"));
}

#[test]
fn test_cyclic_includes_terminate_with_each_file_once() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <library id="root"/>
                    <include location="a.xml"/>
                </server>"#,
            ),
            (
                "a.xml",
                r#"<server>
                    <library id="a"/>
                    <include location="b.xml"/>
                </server>"#,
            ),
            (
                "b.xml",
                r#"<server>
                    <library id="b"/>
                    <include location="a.xml"/>
                </server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    let libraries = engine.resolve_elements(&root, "library", "id").unwrap();
    let ids: Vec<&str> = libraries.iter().filter_map(|l| l.attribute("id")).collect();
    assert_eq!(ids, vec!["root", "a", "b"]);
}

#[test]
fn test_include_location_with_variable_reference() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <include location="${extras.file}"/>
                </server>"#,
            ),
            ("extras.xml", r#"<server><library id="x"/></server>"#),
        ],
    );

    let mut store = VariableStore::new();
    store.add_resolved("extras.file", "extras.xml", None, None);

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry).with_variables(&store);
    let libraries = engine.resolve_elements(&root, "library", "id").unwrap();
    assert_eq!(libraries.len(), 1);
    assert_eq!(libraries[0].attribute("id"), Some("x"));
}

#[test]
fn test_variable_collection_and_resolution_full_tree() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <variable name="base.port" value="9000"/>
                    <variable name="http.port" value="${base.port}+${offset}"/>
                    <variable name="host" defaultValue="localhost"/>
                    <include location="net.xml"/>
                </server>"#,
            ),
            (
                "net.xml",
                r#"<server><variable name="offset" value="80"/></server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let mut store = VariableStore::new();
    let layout = ServerLayout::from_config_root(&root).unwrap();
    layout.populate_predefined(&mut store);
    collect_variables(&registry, &root, &mut store).unwrap();

    // Arithmetic across files, defaults filling gaps
    assert_eq!(store.value("http.port"), Some("9080"));
    assert_eq!(store.value("host"), Some("localhost"));
    assert_eq!(store.var_type("http.port"), Some(VariableType::Short));
    assert_eq!(
        store.var_type("wlp.server.name"),
        Some(VariableType::String)
    );

    let url = variables::resolve(&store, "http://${host}:${http.port}/", None);
    assert!(url.is_fully_resolved());
    assert_eq!(url.text(), "http://localhost:9080/");
}

#[test]
fn test_bootstrap_feeds_variable_resolution() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <variable name="endpoint" value="${bootstrap.host}:${default.http.port}"/>
                </server>"#,
            ),
            (
                "bootstrap.properties",
                "default.http.port=9080\nbootstrap.host=prod.example.com\n",
            ),
            ("server.env", "JAVA_HOME=/opt/java\n"),
        ],
    );

    let layout = ServerLayout::from_config_root(&root).unwrap();
    let mut store = VariableStore::new();
    bootstrap::populate_store(
        &mut store,
        &layout.bootstrap_properties(),
        &layout.server_env(),
    )
    .unwrap();
    assert_eq!(store.value("env.JAVA_HOME"), Some("/opt/java"));

    let registry = DocumentRegistry::new();
    collect_variables(&registry, &root, &mut store).unwrap();
    assert_eq!(store.value("endpoint"), Some("prod.example.com:9080"));
}

#[test]
fn test_unparseable_include_is_skipped() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <library id="root"/>
                    <include location="bad.xml"/>
                    <include location="good.xml"/>
                </server>"#,
            ),
            ("bad.xml", "<server><broken</server>"),
            ("good.xml", r#"<server><library id="good"/></server>"#),
        ],
    );

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    let libraries = engine.resolve_elements(&root, "library", "id").unwrap();
    let ids: Vec<&str> = libraries.iter().filter_map(|l| l.attribute("id")).collect();
    assert_eq!(ids, vec!["root", "good"]);

    let files = registry.all_config_files(&root, None).unwrap();
    let names: Vec<&str> = files
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    assert_eq!(names, vec!["server.xml", "good.xml"]);

    let text = flatten(&registry, &root, None).unwrap();
    assert!(text.contains("could not be parsed"));
    assert!(text.contains(r#"<library id="good"/>"#));

    let mut store = VariableStore::new();
    collect_variables(&registry, &root, &mut store).unwrap();
}

#[test]
fn test_unparseable_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(&temp, &[("server.xml", "<server><broken</server>")]);

    let registry = DocumentRegistry::new();
    let engine = MergeEngine::new(&registry);
    assert!(engine.resolve_elements(&root, "library", "id").is_err());
    assert!(registry.all_config_files(&root, None).is_err());
    assert!(flatten(&registry, &root, None).is_err());
}

#[test]
fn test_flatten_covers_whole_graph() {
    let temp = TempDir::new().unwrap();
    let root = server_tree(
        &temp,
        &[
            (
                "server.xml",
                r#"<server>
                    <featureManager><feature>servlet-4.0</feature></featureManager>
                    <include location="extra.xml"/>
                </server>"#,
            ),
            ("extra.xml", r#"<server><library id="L"/></server>"#),
            (
                "configDropins/overrides/o.xml",
                r#"<server><logging traceSpecification="*=info"/></server>"#,
            ),
        ],
    );

    let registry = DocumentRegistry::new();
    let text = flatten(&registry, &root, None).unwrap();
    assert!(text.contains("<feature>servlet-4.0</feature>"));
    assert!(text.contains(r#"<library id="L"/>"#));
    assert!(text.contains("Begin override dropin"));
    let library = text.find("library").unwrap();
    let logging = text.find("logging").unwrap();
    assert!(library < logging);
}
