//! Finding descriptions with `{arg}` and `{arg:DECIMALS.PLACES}` placeholders,
//! compiled once when the configuration is loaded.

use alloy::primitives::U256;
use std::collections::BTreeMap;
use thiserror::Error;

use super::threshold::{AmountError, TokenAmount};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in `{0}`")]
    Unterminated(String),
    #[error("stray `}}` in `{0}`")]
    StrayBrace(String),
    #[error("empty placeholder in `{0}`")]
    EmptyPlaceholder(String),
    #[error("bad format `{format}` for `{arg}`, expected DECIMALS.PLACES")]
    BadFormat { arg: String, format: String },
    #[error("placeholder `{arg}` is not an argument of {event}")]
    UnknownArg { arg: String, event: String },
    #[error("no value for `{0}`")]
    MissingValue(String),
    #[error("`{arg}` is not an unsigned integer: `{value}`")]
    NotNumeric { arg: String, value: String },
    #[error(transparent)]
    Amount(#[from] AmountError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Raw(String),
    Units { arg: String, decimals: u8, places: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionTemplate {
    segments: Vec<Segment>,
}

impl DescriptionTemplate {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            let open = rest.find('{');
            let close = rest.find('}');
            match (open, close) {
                (None, None) => {
                    segments.push(Segment::Literal(rest.to_string()));
                    break;
                }
                (_, Some(c)) if open.map_or(true, |o| c < o) => {
                    return Err(TemplateError::StrayBrace(text.to_string()));
                }
                (Some(o), Some(c)) => {
                    if o > 0 {
                        segments.push(Segment::Literal(rest[..o].to_string()));
                    }
                    segments.push(parse_placeholder(&rest[o + 1..c], text)?);
                    rest = &rest[c + 1..];
                }
                (Some(_), None) => return Err(TemplateError::Unterminated(text.to_string())),
                (None, Some(_)) => return Err(TemplateError::StrayBrace(text.to_string())),
            }
        }

        Ok(Self { segments })
    }

    pub fn arg_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Literal(_) => None,
            Segment::Raw(arg) | Segment::Units { arg, .. } => Some(arg.as_str()),
        })
    }

    /// Fails at load time if a placeholder names something the event never
    /// carries.
    pub fn check_args(&self, available: &[String], event: &str) -> Result<(), TemplateError> {
        match self.arg_names().find(|arg| !available.iter().any(|a| a == arg)) {
            Some(arg) => Err(TemplateError::UnknownArg {
                arg: arg.to_string(),
                event: event.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self, args: &BTreeMap<String, String>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Raw(arg) => out.push_str(lookup(args, arg)?),
                Segment::Units { arg, decimals, places } => {
                    let value = lookup(args, arg)?;
                    let raw: U256 = value.parse().map_err(|_| TemplateError::NotNumeric {
                        arg: arg.clone(),
                        value: value.to_string(),
                    })?;
                    out.push_str(&TokenAmount::new(raw, *decimals)?.to_fixed(*places)?);
                }
            }
        }
        Ok(out)
    }
}

fn lookup<'a>(args: &'a BTreeMap<String, String>, arg: &str) -> Result<&'a str, TemplateError> {
    args.get(arg)
        .map(String::as_str)
        .ok_or_else(|| TemplateError::MissingValue(arg.to_string()))
}

fn parse_placeholder(inner: &str, text: &str) -> Result<Segment, TemplateError> {
    let (arg, format) = match inner.split_once(':') {
        Some((arg, format)) => (arg.trim(), Some(format.trim())),
        None => (inner.trim(), None),
    };
    if arg.is_empty() {
        return Err(TemplateError::EmptyPlaceholder(text.to_string()));
    }
    let Some(format) = format else {
        return Ok(Segment::Raw(arg.to_string()));
    };

    let bad = || TemplateError::BadFormat {
        arg: arg.to_string(),
        format: format.to_string(),
    };
    let (decimals, places) = format.split_once('.').ok_or_else(bad)?;
    let decimals: u8 = decimals.parse().map_err(|_| bad())?;
    // Scales past 10^77 do not fit a U256.
    TokenAmount::new(U256::ZERO, decimals).map_err(|_| bad())?;
    Ok(Segment::Units {
        arg: arg.to_string(),
        decimals,
        places: places.parse().map_err(|_| bad())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn renders_literal_only() {
        let template = DescriptionTemplate::parse("Lido DAO contract was stopped").unwrap();
        assert_eq!(template.render(&args(&[])).unwrap(), "Lido DAO contract was stopped");
    }

    #[test]
    fn renders_raw_and_unit_placeholders() {
        let template = DescriptionTemplate::parse("{amount:18.2} ETH staked by {sender}").unwrap();
        let rendered = template
            .render(&args(&[("amount", "32000000000000000000"), ("sender", "0xabc")]))
            .unwrap();
        assert_eq!(rendered, "32.00 ETH staked by 0xabc");
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(DescriptionTemplate::parse("oops {x"), Err(TemplateError::Unterminated(_))));
        assert!(matches!(DescriptionTemplate::parse("oops } x"), Err(TemplateError::StrayBrace(_))));
        assert!(matches!(DescriptionTemplate::parse("a {} b"), Err(TemplateError::EmptyPlaceholder(_))));
        assert!(matches!(DescriptionTemplate::parse("{x:18}"), Err(TemplateError::BadFormat { .. })));
        assert!(matches!(DescriptionTemplate::parse("{x:a.b}"), Err(TemplateError::BadFormat { .. })));
    }

    #[test]
    fn rejects_decimals_beyond_u256_scale() {
        assert!(matches!(
            DescriptionTemplate::parse("{amount:80.2}"),
            Err(TemplateError::BadFormat { .. })
        ));
        let widest = DescriptionTemplate::parse("{amount:77.0}").unwrap();
        assert_eq!(widest.render(&args(&[("amount", "0")])).unwrap(), "0");
    }

    #[test]
    fn check_args_flags_unknown_names() {
        let template = DescriptionTemplate::parse("set to {withdrawalCredentials}").unwrap();
        assert!(template
            .check_args(&["withdrawalCredentials".to_string()], "WithdrawalCredentialsSet")
            .is_ok());
        assert_eq!(
            template.check_args(&["amount".to_string()], "ELRewardsReceived"),
            Err(TemplateError::UnknownArg {
                arg: "withdrawalCredentials".to_string(),
                event: "ELRewardsReceived".to_string(),
            })
        );
    }

    #[test]
    fn render_fails_on_non_numeric_units() {
        let template = DescriptionTemplate::parse("{amount:18.2}").unwrap();
        assert!(matches!(
            template.render(&args(&[("amount", "0xzz")])),
            Err(TemplateError::NotNumeric { .. })
        ));
        assert!(matches!(template.render(&args(&[])), Err(TemplateError::MissingValue(_))));
    }
}
