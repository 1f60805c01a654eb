// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Expansion of `{{ ... }}` actions in configuration files
//!
//! Supported actions:
//!
//! * `{{ env "NAME" }}` or `{{ env("NAME") }}` - value of the environment variable, empty if unset
//! * `{{ "text" }}` - a string literal
//! * `{{/* comment */}}` - expands to nothing
//!
//! `{{-` trims whitespace before the action and `-}}` trims whitespace after it.

use crate::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Expand all actions in `input`, resolving `env` lookups through the process environment.
pub fn expand_env(input: &str) -> Result<String, Error> {
    expand(input, |name| std::env::var(name).ok())
}

/// Expand all actions in `input`, resolving `env` lookups with `lookup`.
pub fn expand<F>(input: &str, lookup: F) -> Result<String, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);

        let consumed = input.len() - rest.len();
        let line = input[..consumed + start].matches('\n').count() + 1;

        let after_open = &rest[start + OPEN.len()..];
        let (body, after_close) = split_action(after_open)
            .ok_or_else(|| Error::template(line, "unclosed action"))?;

        let mut body = body;
        if let Some(trimmed) = body.strip_prefix('-') {
            body = trimmed;
            let keep = output.trim_end().len();
            output.truncate(keep);
        }

        let mut trim_after = false;
        if let Some(trimmed) = body.strip_suffix('-') {
            body = trimmed;
            trim_after = true;
        }

        output.push_str(&eval(body.trim(), line, &lookup)?);

        rest = if trim_after {
            after_close.trim_start()
        } else {
            after_close
        };
    }

    output.push_str(rest);
    Ok(output)
}

/// Split at the first `}}` that is not inside a string literal
fn split_action(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => (),
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                return Some((&s[..i], &s[i + CLOSE.len()..]));
            }
            _ => (),
        }
    }

    None
}

fn eval<F>(action: &str, line: usize, lookup: &F) -> Result<String, Error>
where
    F: Fn(&str) -> Option<String>,
{
    if action.starts_with("/*") {
        if action.ends_with("*/") {
            return Ok(String::new());
        }
        return Err(Error::template(line, "unclosed comment"));
    }

    if action.starts_with('"') {
        return string_literal(action, line);
    }

    let name_len = action
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or_else(|| action.len());
    let (func, args) = action.split_at(name_len);

    match func {
        "env" => {
            let args = args.trim();
            let arg = match args.strip_prefix('(') {
                Some(inner) => inner
                    .strip_suffix(')')
                    .ok_or_else(|| Error::template(line, "unclosed call to env"))?
                    .trim(),
                None => args,
            };

            if arg.is_empty() {
                return Err(Error::template(line, "env expects a variable name"));
            }

            let name = string_literal(arg, line)?;
            Ok(lookup(&name).unwrap_or_default())
        }
        "" => Err(Error::template(line, format!("unexpected {:?}", action))),
        other => Err(Error::template(
            line,
            format!("function {:?} not defined", other),
        )),
    }
}

fn string_literal(s: &str, line: usize) -> Result<String, Error> {
    let inner = s
        .strip_prefix('"')
        .ok_or_else(|| Error::template(line, format!("expected a string, found {:?}", s)))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let trailing = chars.as_str().trim();
                if !trailing.is_empty() {
                    return Err(Error::template(
                        line,
                        format!("unexpected {:?} after string", trailing),
                    ));
                }
                return Ok(value);
            }
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some(other) => {
                    return Err(Error::template(
                        line,
                        format!("unknown escape sequence \\{}", other),
                    ))
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(Error::template(line, "unterminated string"))
}
