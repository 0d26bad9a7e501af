//! Built-in map and reduce functions.
//!
//! Every node registers the same set at startup, so a job can name them
//! without shipping code.

use super::tokenizer::{term_frequencies, tokenize};
use crate::codec::{FunctionRegistry, Value};

use std::collections::BTreeSet;

pub const LETTERS_MAP: &str = "letters.map";
pub const WORDS_MAP: &str = "words.map";
pub const SUM_REDUCE: &str = "sum.reduce";
pub const POSTINGS_MAP: &str = "postings.map";
pub const POSTINGS_REDUCE: &str = "postings.reduce";

pub fn register_builtin(functions: &FunctionRegistry) {
    // (key, text) -> [{char: 1}] for every non-blank char
    functions.register(LETTERS_MAP, |args| {
        let text = text_arg(&args, 1)?;
        Ok(Value::array(
            text.chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| Value::object([(c.to_string(), Value::from(1u64))]))
                .collect(),
        ))
    });

    // (key, text) -> [{word: 1}]
    functions.register(WORDS_MAP, |args| {
        let text = text_arg(&args, 1)?;
        Ok(Value::array(
            tokenize(&text)
                .into_iter()
                .map(|word| Value::object([(word, Value::from(1u64))]))
                .collect(),
        ))
    });

    // (key, [n]) -> sum
    functions.register(SUM_REDUCE, |args| {
        let values = args.get(1).and_then(Value::as_vec).unwrap_or_default();
        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| Value::error("TypeError", "sum.reduce expects numbers"))
            })
            .sum::<Result<f64, Value>>()
            .map(Value::Number)
    });

    // (document, text) -> [{term: {document, frequency}}]
    functions.register(POSTINGS_MAP, |args| {
        let document = text_arg(&args, 0)?;
        let text = text_arg(&args, 1)?;
        Ok(Value::array(
            term_frequencies(&text)
                .into_iter()
                .map(|(term, frequency)| {
                    let posting = Value::object([
                        ("document", Value::string(document.clone())),
                        ("frequency", Value::from(frequency)),
                    ]);
                    Value::object([(term, posting)])
                })
                .collect(),
        ))
    });

    // (term, [posting]) -> {df, postings} with postings by descending frequency
    functions.register(POSTINGS_REDUCE, |args| {
        let mut postings = args.get(1).and_then(Value::as_vec).unwrap_or_default();
        let frequency = |p: &Value| p.get("frequency").and_then(|f| f.as_f64()).unwrap_or(0.0);
        let document = |p: &Value| {
            p.get("document")
                .and_then(|d| d.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        postings.sort_by(|a, b| {
            frequency(b)
                .total_cmp(&frequency(a))
                .then_with(|| document(a).cmp(&document(b)))
        });
        let df = postings.iter().map(document).collect::<BTreeSet<_>>().len();
        Ok(Value::object([
            ("df", Value::from(df)),
            ("postings", Value::array(postings)),
        ]))
    });
}

fn text_arg(args: &[Value], index: usize) -> Result<String, Value> {
    args.get(index)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| Value::error("TypeError", "expected a string argument"))
}
