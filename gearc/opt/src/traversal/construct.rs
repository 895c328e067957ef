use gearc_utils::GearResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;

#[derive(Clone, Debug, PartialEq)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// A number option.
    Num(i64),
}

impl ParseVal {
    pub fn bool(&self) -> bool {
        let ParseVal::Bool(b) = self else {
            panic!("Expected bool, got {self}");
        };
        *b
    }

    pub fn num(&self) -> i64 {
        let ParseVal::Num(n) = self else {
            panic!("Expected number, got {self}");
        };
        *n
    }

    pub fn pos_num(&self) -> Option<u64> {
        let n = self.num();
        if n < 0 { None } else { Some(n as u64) }
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Option that can be passed to a pass.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    /// Parse a number from a string.
    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }
}

/// Trait that describes named things.
///
/// This is separate from the pass implementations because these methods don't
/// receive `self`, so options can be listed before a pass is constructed.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
    /// Set of options that can be passed to the pass.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Construct a pass from the extra options given to the compiler.
pub trait ConstructPass {
    /// Values of this pass's options. Options are given as `pass:opt` or
    /// `pass:opt=val`; unknown options and invalid values are ignored with a
    /// warning and missing options take their default.
    fn get_opts(extra_opts: &[String]) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let opts = Self::opts();
        let n = Self::name();
        let mut values: LinkedHashMap<&'static str, ParseVal> = extra_opts
            .iter()
            .filter_map(|opt| {
                let mut splits = opt.split(':');
                if let Some(pass) = splits.next() {
                    if pass == n {
                        let mut splits = splits.next()?.split('=');
                        let opt = splits.next()?.to_string();
                        let Some(opt) = opts.iter().find(|o| o.name == opt) else {
                            log::warn!("Ignoring unknown option for pass `{n}`: {opt}");
                            return None;
                        };
                        // A bare `pass:opt` enables a flag.
                        let v = splits.next().unwrap_or("true");
                        let Some(val) = opt.parse(v) else {
                            log::warn!(
                                "Ignoring invalid value for option `{n}:{}`: {v}",
                                opt.name(),
                            );
                            return None;
                        };
                        return Some((opt.name(), val));
                    }
                }
                None
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Extra options for {}: {}",
                Self::name(),
                values.iter().map(|(o, v)| format!("{o}->{v}")).join(", ")
            );
        }

        // For all options that were not provided with values, fill in the defaults.
        for opt in opts {
            if !values.contains_key(opt.name()) {
                values.insert(opt.name(), opt.default.clone());
            }
        }

        values
    }

    /// Construct the pass using the extra options.
    fn from(extra_opts: &[String]) -> GearResult<Self>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Demo;

    impl Named for Demo {
        fn name() -> &'static str {
            "demo"
        }

        fn description() -> &'static str {
            "pass used to test option parsing"
        }

        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new(
                    "limit",
                    "a numeric limit",
                    ParseVal::Num(8),
                    PassOpt::parse_num,
                ),
                PassOpt::new(
                    "dump",
                    "a flag",
                    ParseVal::Bool(false),
                    PassOpt::parse_bool,
                ),
            ]
        }
    }

    impl ConstructPass for Demo {
        fn from(_extra_opts: &[String]) -> GearResult<Self> {
            Ok(Demo)
        }
    }

    fn opts(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_when_absent() {
        let vals = Demo::get_opts(&[]);
        assert_eq!(vals["limit"], ParseVal::Num(8));
        assert!(!vals["dump"].bool());
    }

    #[test]
    fn explicit_values_and_flags() {
        let vals = Demo::get_opts(&opts(&["demo:limit=3", "demo:dump"]));
        assert_eq!(vals["limit"].pos_num(), Some(3));
        assert!(vals["dump"].bool());
    }

    #[test]
    fn ignores_invalid_and_foreign_options() {
        let vals = Demo::get_opts(&opts(&[
            "demo:limit=many",
            "demo:unknown=1",
            "other:limit=1",
        ]));
        assert_eq!(vals["limit"].num(), 8);
        assert_eq!(vals.len(), 2);
    }
}
