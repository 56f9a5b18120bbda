//! Gesture scripts driving the host binary
//!
//! One gesture per line, `#` starts a comment:
//!
//! ```text
//! pan -10 -10
//! zoom-in 100 140
//! zoom-out 50 70
//! zoom-res 150
//! next
//! prev
//! wait
//! ```

use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    /// Drag the zoom box, in overview pixels
    Pan { dx: f64, dy: f64 },
    ZoomIn { x: f64, y: f64 },
    ZoomOut { x: f64, y: f64 },
    ZoomToRes { resolution: f64 },
    NextPage,
    PrevPage,
    /// Let pending productions finish before the next gesture
    Wait,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: unknown gesture `{word}`")]
    UnknownGesture { line: usize, word: String },

    #[error("line {line}: `{gesture}` takes {expected} argument(s), got {found}")]
    Arity {
        line: usize,
        gesture: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: `{value}` is not a number")]
    BadNumber { line: usize, value: String },
}

/// Parse a whole script; stops at the first bad line
pub fn parse_script(text: &str) -> Result<Vec<Gesture>, ScriptError> {
    let mut gestures = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let content = raw.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        gestures.push(parse_line(index + 1, content)?);
    }
    Ok(gestures)
}

fn parse_line(line: usize, content: &str) -> Result<Gesture, ScriptError> {
    let mut words = content.split_whitespace();
    let Some(word) = words.next() else {
        return Err(ScriptError::UnknownGesture {
            line,
            word: String::new(),
        });
    };
    let args: Vec<&str> = words.collect();

    let gesture = match word {
        "pan" => {
            let [dx, dy] = numbers::<2>(line, "pan", &args)?;
            Gesture::Pan { dx, dy }
        }
        "zoom-in" => {
            let [x, y] = numbers::<2>(line, "zoom-in", &args)?;
            Gesture::ZoomIn { x, y }
        }
        "zoom-out" => {
            let [x, y] = numbers::<2>(line, "zoom-out", &args)?;
            Gesture::ZoomOut { x, y }
        }
        "zoom-res" => {
            let [resolution] = numbers::<1>(line, "zoom-res", &args)?;
            Gesture::ZoomToRes { resolution }
        }
        "next" => {
            numbers::<0>(line, "next", &args)?;
            Gesture::NextPage
        }
        "prev" => {
            numbers::<0>(line, "prev", &args)?;
            Gesture::PrevPage
        }
        "wait" => {
            numbers::<0>(line, "wait", &args)?;
            Gesture::Wait
        }
        other => {
            return Err(ScriptError::UnknownGesture {
                line,
                word: other.to_string(),
            });
        }
    };
    Ok(gesture)
}

fn numbers<const N: usize>(
    line: usize,
    gesture: &'static str,
    args: &[&str],
) -> Result<[f64; N], ScriptError> {
    if args.len() != N {
        return Err(ScriptError::Arity {
            line,
            gesture,
            expected: N,
            found: args.len(),
        });
    }
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = f64::from_str(arg).map_err(|_| ScriptError::BadNumber {
            line,
            value: (*arg).to_string(),
        })?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_gesture() {
        let script = "\
# warm up
pan -10 -10
zoom-in 100 140.5
zoom-out 1 2   # trailing comment

zoom-res 150
next
prev
wait
";
        assert_eq!(
            parse_script(script).unwrap(),
            vec![
                Gesture::Pan {
                    dx: -10.0,
                    dy: -10.0
                },
                Gesture::ZoomIn { x: 100.0, y: 140.5 },
                Gesture::ZoomOut { x: 1.0, y: 2.0 },
                Gesture::ZoomToRes { resolution: 150.0 },
                Gesture::NextPage,
                Gesture::PrevPage,
                Gesture::Wait,
            ]
        );
    }

    #[test]
    fn reports_line_of_bad_input() {
        assert_eq!(
            parse_script("next\nspin 1"),
            Err(ScriptError::UnknownGesture {
                line: 2,
                word: "spin".to_string()
            })
        );
        assert_eq!(
            parse_script("pan 1"),
            Err(ScriptError::Arity {
                line: 1,
                gesture: "pan",
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            parse_script("\n\nzoom-res fast"),
            Err(ScriptError::BadNumber {
                line: 3,
                value: "fast".to_string()
            })
        );
        assert!(parse_script("next 3").is_err());
    }

    #[test]
    fn empty_script_is_empty() {
        assert!(parse_script("# nothing\n\n").unwrap().is_empty());
    }
}
