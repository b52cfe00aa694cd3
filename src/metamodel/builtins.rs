//! Base types available to every grammar.

use anyhow::Context;
use grammar::Grammar;

use super::ValueType;
use crate::error::GrammarError;
use crate::model::Value;

const BASE_TYPES: &str = r#"
ID: /[^\d\W]\w*\b/;
BOOL: /(true|false|0|1)\b/;
INT: /[-+]?[0-9]+\b/;
STRICTFLOAT[noskipws]: /[-+]?((\d+\.\d*|\.\d+)([eE][-+]?\d+)?|\d+[eE][-+]?\d+)/ !/[\w.]/;
FLOAT[noskipws]: /[-+]?((\d+\.\d*|\.\d+)([eE][-+]?\d+)?|\d+[eE][-+]?\d+)/ !/[\w.]/;
NUMBER: STRICTFLOAT | INT;
STRING: /"(\\.|[^"\\])*"|'(\\.|[^'\\])*'/;
BASETYPE: NUMBER | BOOL | ID | STRING;
"#;

pub const BASE_TYPE_NAMES: [&str; 8] = [
    "ID",
    "BOOL",
    "INT",
    "STRICTFLOAT",
    "FLOAT",
    "NUMBER",
    "STRING",
    "BASETYPE",
];

pub fn grammar() -> Result<Grammar, GrammarError> {
    Ok(BASE_TYPES.parse()?)
}

pub fn is_base_type(name: &str) -> bool {
    BASE_TYPE_NAMES.contains(&name)
}

pub fn check_reserved(grammar: &Grammar) -> Result<(), GrammarError> {
    match grammar.rules.iter().find(|r| is_base_type(r.name.as_str())) {
        Some(rule) => Err(GrammarError::ReservedName(rule.name.0.clone())),
        None => Ok(()),
    }
}

pub fn value_type(name: &str) -> Option<ValueType> {
    let ty = match name {
        "ID" | "STRING" => ValueType::Str,
        "BOOL" => ValueType::Bool,
        "INT" => ValueType::Int,
        "STRICTFLOAT" | "FLOAT" | "NUMBER" => ValueType::Float,
        "BASETYPE" => ValueType::Any,
        _ => return None,
    };
    Some(ty)
}

/// Converts text matched by a base type. `NUMBER` and `BASETYPE` pass
/// through the value of the alternative that matched and have no conversion.
pub fn convert(name: &str, text: &str) -> Option<anyhow::Result<Value>> {
    let value = match name {
        "ID" => Ok(Value::Str(text.to_owned())),
        "BOOL" => Ok(Value::Bool(text == "true" || text == "1")),
        "INT" => text
            .parse::<i64>()
            .map(Value::Int)
            .with_context(|| format!("'{}' is not a valid integer", text)),
        "STRICTFLOAT" | "FLOAT" => text
            .parse::<f64>()
            .map(Value::Float)
            .with_context(|| format!("'{}' is not a valid float", text)),
        "STRING" => Ok(Value::Str(unquote(text))),
        _ => return None,
    };
    Some(value)
}

/// Strips the quotes of a `STRING` match and resolves backslash escapes.
pub fn unquote(text: &str) -> String {
    let inner = if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        text
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(e @ ('\\' | '\'' | '"')) => out.push(e),
            Some(e) => {
                out.push('\\');
                out.push(e);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_grammar_parses() {
        let g = grammar().unwrap();
        let names: Vec<&str> = g.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, BASE_TYPE_NAMES.to_vec());
    }

    #[test]
    fn conversions() {
        let tests = vec![
            ("INT", "-42", Value::Int(-42)),
            ("INT", "+7", Value::Int(7)),
            ("FLOAT", "1.5e3", Value::Float(1500.0)),
            ("STRICTFLOAT", ".5", Value::Float(0.5)),
            ("BOOL", "true", Value::Bool(true)),
            ("BOOL", "0", Value::Bool(false)),
            ("ID", "name", Value::Str("name".to_owned())),
            ("STRING", r#""say \"hi\"""#, Value::Str("say \"hi\"".to_owned())),
            ("STRING", r"'a\tb'", Value::Str("a\tb".to_owned())),
        ];
        for (rule, text, want) in tests {
            let got = convert(rule, text).unwrap().unwrap();
            assert_eq!(got, want, "{} {}", rule, text);
        }

        assert!(convert("NUMBER", "1").is_none());
        assert!(convert("INT", "99999999999999999999").unwrap().is_err());
    }

    #[test]
    fn reserved_names() {
        let g: Grammar = "Model: x=INT; INT: /\\d+/;".parse().unwrap();
        assert!(matches!(check_reserved(&g), Err(GrammarError::ReservedName(n)) if n == "INT"));
    }
}
