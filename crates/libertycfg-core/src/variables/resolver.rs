//! `${...}` reference expansion
//!
//! Expands variable references in attribute and property text against a
//! [`VariableLookup`]. Resolution never fails: anything that cannot be
//! substituted stays literal in the output and is reported through the
//! returned [`Resolution`] diagnostics instead.
//!
//! Recognized forms:
//! - `${name}` plain substitution
//! - `${list(name)}` list-expansion marker, substitution otherwise identical
//! - integer expressions, one level only, written either inside one
//!   reference (`${left+right}`) or across references (`${a}+${b}`)

use super::store::VariableLookup;
use super::types::VariableType;

/// Most undefined references recorded per call
const MAX_UNDEFINED_REFS: usize = 4;

const OPERATORS: &[char] = &['+', '-', '*', '/'];

/// An undefined `${name}` reference: name plus byte offset of the name in
/// the input text
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UndefinedRef {
    pub name: String,
    pub offset: usize,
}

/// Why an arithmetic operand could not be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandError {
    /// Operand text is empty
    Missing,
    /// Operand names a variable that is not defined
    Undefined,
    /// Operand (or the variable it names) is not an integer
    InvalidValue,
}

/// Outcome of one resolution call
#[derive(Debug, Clone)]
pub struct Resolution {
    text: String,
    undefined: Vec<UndefinedRef>,
    type_mismatch: bool,
    invalid_expression: bool,
    left_error: Option<OperandError>,
    right_error: Option<OperandError>,
}

impl Resolution {
    fn new() -> Self {
        Self {
            text: String::new(),
            undefined: Vec::new(),
            type_mismatch: false,
            invalid_expression: false,
            left_error: None,
            right_error: None,
        }
    }

    /// The substituted text. Unresolved references are left verbatim.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// True iff no undefined plain references were recorded
    pub fn is_fully_resolved(&self) -> bool {
        self.undefined.is_empty()
    }

    pub fn undefined_references(&self) -> &[UndefinedRef] {
        &self.undefined
    }

    pub fn has_type_mismatch(&self) -> bool {
        self.type_mismatch
    }

    pub fn has_invalid_expression(&self) -> bool {
        self.invalid_expression
    }

    pub fn left_operand_error(&self) -> Option<OperandError> {
        self.left_error
    }

    pub fn right_operand_error(&self) -> Option<OperandError> {
        self.right_error
    }

    fn check_expected(&mut self, expected: Option<VariableType>, actual: VariableType) {
        if let Some(expected) = expected {
            if !expected.accepts(actual) {
                self.type_mismatch = true;
            }
        }
    }
}

/// Quick check for an unexpanded `${...}` reference
pub fn contains_reference(text: &str) -> bool {
    text.find("${")
        .is_some_and(|start| text[start..].contains('}'))
}

/// Variable names referenced by `text`, including `list(...)` targets and
/// non-numeric expression operands. Used for dependency ordering.
pub fn referenced_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let inner = &after[..end];
        if let Some(name) = list_target(inner) {
            names.push(name.to_string());
        } else if let Some(op_idx) = inner.find(|c| OPERATORS.contains(&c)) {
            let right = inner[op_idx + 1..].trim();
            for operand in [inner[..op_idx].trim(), right] {
                if !operand.is_empty() && operand.parse::<i64>().is_err() {
                    names.push(operand.to_string());
                }
            }
        } else {
            names.push(inner.trim().to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

/// Expand every `${...}` reference in `text` against `store`.
///
/// `expected_type` only flags a mismatch in the diagnostics; it never blocks
/// substitution.
pub fn resolve<S: VariableLookup + ?Sized>(
    store: &S,
    text: &str,
    expected_type: Option<VariableType>,
) -> Resolution {
    let mut result = Resolution::new();

    if try_whole_expression(store, text, expected_type, &mut result) {
        return result;
    }

    let mut pos = 0;
    while let Some(rel) = text[pos..].find("${") {
        let start = pos + rel;
        result.text.push_str(&text[pos..start]);
        let Some(rel_end) = text[start + 2..].find('}') else {
            // Unterminated reference, copy verbatim
            result.text.push_str(&text[start..]);
            return result;
        };
        let end = start + 2 + rel_end;
        let inner = &text[start + 2..end];

        if let Some(name) = list_target(inner) {
            substitute_name(store, name, start + 2, expected_type, &mut result);
        } else if let Some(op_idx) = inner.find(|c| OPERATORS.contains(&c)) {
            evaluate_inner_expression(
                store,
                inner,
                op_idx,
                expected_type,
                &mut result,
                &text[start..=end],
            );
        } else {
            substitute_name(store, inner.trim(), start + 2, expected_type, &mut result);
        }
        pos = end + 1;
    }
    result.text.push_str(&text[pos..]);
    result
}

/// `list(NAME)` wrapper target, if `inner` is the list form
fn list_target(inner: &str) -> Option<&str> {
    let stripped = inner.trim().strip_prefix("list(")?;
    let name = stripped.strip_suffix(')')?;
    Some(name.trim())
}

/// An operand of a whole-string expression
enum Operand<'a> {
    Empty,
    Literal(i64),
    Reference(&'a str),
}

impl Operand<'_> {
    fn is_reference(&self) -> bool {
        matches!(self, Operand::Reference(_))
    }
}

/// Strict operand shape: empty, integer literal, or a single `${name}`
fn operand_shape(text: &str) -> Option<Operand<'_>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Operand::Empty);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Operand::Literal(n));
    }
    let name = text.strip_prefix("${")?.strip_suffix('}')?.trim();
    if name.is_empty() || name.contains(['{', '}']) {
        return None;
    }
    Some(Operand::Reference(name))
}

/// First `+ - * /` outside any `${...}` region
fn find_top_level_op(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut inside_ref = false;
    let mut i = 0;
    while i < bytes.len() {
        if inside_ref {
            if bytes[i] == b'}' {
                inside_ref = false;
            }
        } else if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            inside_ref = true;
            i += 1;
        } else if OPERATORS.contains(&(bytes[i] as char)) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Try to interpret the entire input as `OPERAND op OPERAND` where at least
/// one operand is a reference, e.g. `${a}+${b}` or `${port}+1`. Returns
/// false when the text does not have that shape, so ordinary substitution
/// takes over (slashes in URLs do not become division).
fn try_whole_expression<S: VariableLookup + ?Sized>(
    store: &S,
    text: &str,
    expected_type: Option<VariableType>,
    result: &mut Resolution,
) -> bool {
    let Some(op_idx) = find_top_level_op(text) else {
        return false;
    };
    let op = text[op_idx..].chars().next().unwrap_or('+');
    let left_text = &text[..op_idx];
    let right_text = &text[op_idx + 1..];
    let Some(left) = operand_shape(left_text) else {
        return false;
    };

    // One level of chaining only: a second operator after a well-formed
    // operand marks the whole expression invalid.
    if let Some(r_op) = find_top_level_op(right_text) {
        match operand_shape(&right_text[..r_op]) {
            Some(first) if left.is_reference() || first.is_reference() => {
                result.invalid_expression = true;
                result.text.push_str(text);
                return true;
            }
            _ => return false,
        }
    }

    let Some(right) = operand_shape(right_text) else {
        return false;
    };
    if !left.is_reference() && !right.is_reference() {
        return false;
    }

    let left_value = evaluate_shaped(store, &left);
    let right_value = evaluate_shaped(store, &right);
    let (left_value, right_value) = match (left_value, right_value) {
        (Ok(l), Ok(r)) => (l, r),
        (l, r) => {
            result.left_error = l.err();
            result.right_error = r.err();
            result.text.push_str(text);
            return true;
        }
    };
    finish_arithmetic(op, left_value, right_value, expected_type, result, text);
    true
}

fn evaluate_shaped<S: VariableLookup + ?Sized>(
    store: &S,
    operand: &Operand<'_>,
) -> std::result::Result<i64, OperandError> {
    match operand {
        Operand::Empty => Err(OperandError::Missing),
        Operand::Literal(n) => Ok(*n),
        Operand::Reference(name) => {
            let value = store.value(name).ok_or(OperandError::Undefined)?;
            value.trim().parse::<i64>().map_err(|_| OperandError::InvalidValue)
        }
    }
}

fn substitute_name<S: VariableLookup + ?Sized>(
    store: &S,
    name: &str,
    offset: usize,
    expected_type: Option<VariableType>,
    result: &mut Resolution,
) {
    match store.value(name) {
        Some(value) => {
            let actual = store
                .var_type(name)
                .unwrap_or_else(|| VariableType::compute(value));
            result.check_expected(expected_type, actual);
            result.text.push_str(value);
        }
        None => {
            if result.undefined.len() < MAX_UNDEFINED_REFS {
                result.undefined.push(UndefinedRef {
                    name: name.to_string(),
                    offset,
                });
            }
            // Leave the reference literal: ${name}
            result.text.push_str("${");
            result.text.push_str(name);
            result.text.push('}');
        }
    }
}

/// Expression written inside one reference, `${left+right}`. Operands are
/// integer literals or bare variable names.
fn evaluate_inner_expression<S: VariableLookup + ?Sized>(
    store: &S,
    inner: &str,
    op_idx: usize,
    expected_type: Option<VariableType>,
    result: &mut Resolution,
    raw: &str,
) {
    let op = inner[op_idx..].chars().next().unwrap_or('+');
    let right = &inner[op_idx + 1..];

    if right.find(|c| OPERATORS.contains(&c)).is_some() {
        result.invalid_expression = true;
        result.text.push_str(raw);
        return;
    }

    let left_value = evaluate_bare(store, inner[..op_idx].trim());
    let right_value = evaluate_bare(store, right.trim());
    let (left_value, right_value) = match (left_value, right_value) {
        (Ok(l), Ok(r)) => (l, r),
        (l, r) => {
            result.left_error = l.err();
            result.right_error = r.err();
            result.text.push_str(raw);
            return;
        }
    };
    finish_arithmetic(op, left_value, right_value, expected_type, result, raw);
}

fn evaluate_bare<S: VariableLookup + ?Sized>(
    store: &S,
    operand: &str,
) -> std::result::Result<i64, OperandError> {
    if operand.is_empty() {
        return Err(OperandError::Missing);
    }
    if let Ok(n) = operand.parse::<i64>() {
        return Ok(n);
    }
    let value = store.value(operand).ok_or(OperandError::Undefined)?;
    value.trim().parse::<i64>().map_err(|_| OperandError::InvalidValue)
}

fn finish_arithmetic(
    op: char,
    left: i64,
    right: i64,
    expected_type: Option<VariableType>,
    result: &mut Resolution,
    raw: &str,
) {
    let computed = match op {
        '+' => left.checked_add(right),
        '-' => left.checked_sub(right),
        '*' => left.checked_mul(right),
        '/' => left.checked_div(right),
        _ => None,
    };
    match computed {
        Some(value) => {
            let text = value.to_string();
            result.check_expected(expected_type, VariableType::compute(&text));
            result.text.push_str(&text);
        }
        None => {
            // Overflow or division by zero
            result.right_error = Some(OperandError::InvalidValue);
            result.text.push_str(raw);
        }
    }
}
