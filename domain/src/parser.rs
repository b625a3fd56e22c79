// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for domain files and default-configuration files.
//!
//! Both are line-based: each non-blank line is a name followed by
//! whitespace-separated values, and `#` starts a comment.

use crate::syntax::{Config, Domain, DomainError, Variable};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use peg::{error::ParseError, str::LineCol};

struct Record<'a> {
    pos: usize,
    name: &'a str,
    values: Vec<&'a str>,
}

peg::parser! {

grammar parser() for str {
    rule ws() = quiet!{ [' ' | '\t']+ }
    rule comment() = "#" [^'\n' | '\r']*
    rule nl() = quiet!{ "\r"? "\n" } / expected!("newline")

    rule token() -> &'input str
    = quiet!{ $([^' ' | '\t' | '\n' | '\r' | '#']+) } / expected!("name or value")

    rule record() -> Record<'input>
    = pos:position!() name:token() values:(ws() v:token() { v })*
    { Record { pos, name, values } }

    rule line() -> Option<Record<'input>>
    = ws()? r:record()? ws()? comment()? { r }

    pub(super) rule lines() -> Vec<Option<Record<'input>>>
    = ls:(line() ** nl()) ![_] { ls }
}
}

fn syntax_error(e: ParseError<LineCol>) -> DomainError {
    DomainError::Parse {
        line: e.location.line,
        offset: e.location.offset,
        msg: format!("expected {}", e.expected),
    }
}

fn at_line(line: usize, offset: usize, e: DomainError) -> DomainError {
    DomainError::Parse {
        line,
        offset,
        msg: e.to_string(),
    }
}

/// Non-blank records with their 1-based line numbers.
fn records(s: &str) -> Result<Vec<(usize, Record<'_>)>, DomainError> {
    let lines = parser::lines(s).map_err(syntax_error)?;
    Ok(lines
        .into_iter()
        .enumerate()
        .filter_map(|(i, r)| r.map(|r| (i + 1, r)))
        .collect())
}

/// Parse a domain file, e.g.
///
/// ```text
/// # name values...
/// x 0 1 2
/// n inf
/// ```
pub fn parse_domain(s: &str) -> Result<Domain, DomainError> {
    let mut vars: Vec<Variable> = vec![];
    for (line, r) in records(s)? {
        let v = Variable::new(r.name, r.values).map_err(|e| at_line(line, r.pos, e))?;
        if vars.iter().any(|w| w.name == v.name) {
            return Err(at_line(
                line,
                r.pos,
                DomainError::DuplicateVariable(v.name),
            ));
        }
        vars.push(v);
    }
    Domain::new(vars)
}

/// Parse a default-configuration file: one `name value` line per
/// variable. Extra values on a line are ignored, and a repeated variable
/// keeps its last value.
pub fn parse_default(dom: &Domain, s: &str) -> Result<Config, DomainError> {
    let mut values = vec![None; dom.len()];
    for (line, r) in records(s)? {
        let value = r
            .values
            .first()
            .ok_or_else(|| at_line(line, r.pos, DomainError::EmptyValues(r.name.to_string())))?;
        let (var, val) = dom.setting(r.name, value).map_err(|e| at_line(line, r.pos, e))?;
        if values[var].replace(val).is_some() {
            log::warn!("line {line}: {} is set again, keeping {value}", r.name);
        }
    }
    let values = values
        .into_iter()
        .enumerate()
        .map(|(var, val)| val.ok_or_else(|| DomainError::MissingVariable(dom.var(var).name.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Config::from_values(values))
}

/// Convert an opaque FileId and error to a readable `Diagnostic`
pub fn domain_error_diagnostic<FileId>(file_id: FileId, e: &DomainError) -> Diagnostic<FileId> {
    match e {
        DomainError::Parse { offset, msg, .. } => Diagnostic::error()
            .with_message("could not parse file")
            .with_labels(vec![
                Label::primary(file_id, *offset..*offset + 1).with_message(msg.clone())
            ]),
        _ => Diagnostic::error().with_message(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_domain() {
        let dom = parse_domain(
            "# a comment\n\
             x 2 1 0\n\
             \n\
             y 1  0   # trailing\n\
             \tn inf\n",
        )
        .unwrap();
        insta::assert_display_snapshot!(dom, @r###"
        3 vars and 18 pos configs
        1. x: (3) 0,1,2
        2. y: (2) 0,1
        3. n: (3) Eq0,Gt0,Lt0
        "###);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_domain("x 0 1\ny\n"),
            Err(DomainError::Parse {
                line: 2,
                offset: 6,
                msg: "variable y has no values".to_string()
            })
        );
        assert_eq!(
            parse_domain("x 0 1\n\nx 2\n"),
            Err(DomainError::Parse {
                line: 3,
                offset: 7,
                msg: "variable x is declared more than once".to_string()
            })
        );
        assert_eq!(parse_domain("# nothing\n"), Err(DomainError::NoVariables));
    }

    #[test]
    fn test_parse_default() {
        let dom = parse_domain("x 0 1 2\ny 0 1\n").unwrap();
        let c = parse_default(&dom, "y 1\nx 2 # default\n").unwrap();
        assert_eq!(c.display(&dom).to_string(), "x=2 y=1");
        assert_eq!(
            parse_default(&dom, "x 2\n"),
            Err(DomainError::MissingVariable("y".to_string()))
        );
        // a repeated record overrides the earlier one
        let c = parse_default(&dom, "x 0\ny 0\nx 1\n").unwrap();
        assert_eq!(c.display(&dom).to_string(), "x=1 y=0");
        assert!(matches!(
            parse_default(&dom, "x 3\ny 0\n"),
            Err(DomainError::Parse { line: 1, .. })
        ));
    }
}
