//! Parsing options for input formats, and the data shapes a CLI layer
//! would populate to drive [`crate::pipeline::LinkPipeline`] (the CLI
//! parser itself is out of scope; see `SPEC_FULL.md` §3.6).

/// Binary parsing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Standard parsing mode - fails on malformed data
    Strict,
    /// Permissive parsing mode - attempts to recover from malformed data
    Permissive,
}

impl Default for ParseMode {
    fn default() -> Self {
        ParseMode::Strict
    }
}

impl ParseMode {
    /// Check if this is permissive mode
    pub(crate) fn is_permissive(&self) -> bool {
        matches!(self, ParseMode::Permissive)
    }

    /// Check if this is strict mode
    pub(crate) fn is_strict(&self) -> bool {
        matches!(self, ParseMode::Strict)
    }
}

/// Common parsing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// The parsing mode to use
    pub parse_mode: ParseMode,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            parse_mode: ParseMode::Strict,
        }
    }
}

impl ParseOptions {
    /// Create new ParseOptions with default settings
    pub fn new() -> Self {
        Default::default()
    }

    /// Create ParseOptions with permissive mode enabled
    pub fn permissive() -> Self {
        ParseOptions {
            parse_mode: ParseMode::Permissive,
        }
    }

    /// Create ParseOptions with strict mode enabled
    pub fn strict() -> Self {
        ParseOptions {
            parse_mode: ParseMode::Strict,
        }
    }

    /// Set the parse mode
    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }
}

/// Helper trait to ease permissive parsing fallbacks.
///
/// When `permissive` is true, errors are downgraded to warnings (if `log` feature is enabled)
/// and a default or provided value is used instead; otherwise the original error is propagated.
pub(crate) trait Permissive<T, E> {
    fn or_permissive_and_default(
        self,
        permissive: bool,
        context: &str,
    ) -> core::result::Result<T, E>;

    #[allow(unused)]
    fn or_permissive_and_value(
        self,
        permissive: bool,
        context: &str,
        value: T,
    ) -> core::result::Result<T, E>;

    #[allow(unused)]
    fn or_permissive_and_then<F>(
        self,
        permissive: bool,
        context: &str,
        f: F,
    ) -> core::result::Result<T, E>
    where
        F: FnOnce() -> T;

    // no lazy-with-ctx variants; use static messages to avoid allocations
}

impl<T: Default, E: core::fmt::Display> Permissive<T, E> for core::result::Result<T, E> {
    #[allow(unused)]
    fn or_permissive_and_default(
        self,
        permissive: bool,
        context: &str,
    ) -> core::result::Result<T, E> {
        self.or_else(|e| {
            if permissive {
                #[cfg(feature = "log")]
                log::warn!("{context}: {e}, continuing with empty/default value");
                Ok(T::default())
            } else {
                Err(e)
            }
        })
    }

    #[allow(unused)]
    fn or_permissive_and_value(
        self,
        permissive: bool,
        context: &str,
        value: T,
    ) -> core::result::Result<T, E> {
        self.or_else(|e| {
            if permissive {
                #[cfg(feature = "log")]
                log::warn!("{context}: {e}, continuing with provided value");
                Ok(value)
            } else {
                Err(e)
            }
        })
    }

    // removed: *_with_ctx helpers (prefer static messages)

    #[allow(unused)]
    fn or_permissive_and_then<F>(
        self,
        permissive: bool,
        context: &str,
        f: F,
    ) -> core::result::Result<T, E>
    where
        F: FnOnce() -> T,
    {
        self.or_else(|e| {
            if permissive {
                #[cfg(feature = "log")]
                log::warn!("{context}: {e}, continuing with computed value");
                Ok(f())
            } else {
                Err(e)
            }
        })
    }

    // removed: *_with_ctx helpers (prefer static messages)

    // removed: *_with_ctx helpers (prefer static messages)
}

/// A `-P key=value` linker-script parameter, referenced in a script as
/// `?key?`. Either an integer or a symbolic location (e.g. a base address
/// carried over from another module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkerParameter {
    Integer(i64),
    Location(crate::location::Location),
}

impl LinkerParameter {
    /// The integer value of this parameter for expression evaluation.
    /// A `Location` parameter evaluates to its section-relative offset;
    /// callers that need the resolved address should consult the module
    /// directly instead.
    pub fn as_integer(&self) -> i64 {
        match self {
            LinkerParameter::Integer(v) => *v,
            LinkerParameter::Location(loc) => loc.offset as i64,
        }
    }
}

/// The output path, format chain, and other per-link settings a CLI layer
/// would otherwise populate from argv. Plain data only; no argument parser
/// lives in this crate.
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// Output file path; `None` means "derive from the first input and the
    /// driver's `default_extension`".
    pub output_path: Option<String>,
    /// Selected `FormatDriver` identifier, plus any `+subformat` chain
    /// (e.g. `["macos", "rsrc", "finf"]` for `-F macos+rsrc+finf`).
    pub format_chain: Vec<String>,
    /// `-M MODEL` memory model tag, passed through to the driver
    /// uninterpreted by the core.
    pub memory_model: Option<String>,
    /// `-T FILE` linker script path, overriding the driver's built-in script.
    pub script_path: Option<String>,
    /// `-P key=value` linker parameters.
    pub parameters: std::collections::HashMap<String, LinkerParameter>,
    /// `-S key[=value]` driver-specific options, passed through uninterpreted.
    pub driver_options: std::collections::HashMap<String, Option<String>>,
    /// `-d NAME[=VAL|=SEG:OFF]` symbol injections, resolved through
    /// [`crate::pipeline`]'s reference-to-location mechanism.
    pub symbol_injections: std::collections::HashMap<String, String>,
    /// `-$ CHAR` special-prefix character input formats use to encode
    /// segmentation hints in plain symbol names.
    pub special_prefix: char,
}

impl LinkOptions {
    pub fn new() -> Self {
        LinkOptions {
            special_prefix: '$',
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod param_tests {
    use super::*;

    #[test]
    fn link_options_default_special_prefix_is_dollar() {
        assert_eq!(LinkOptions::new().special_prefix, '$');
    }

    #[test]
    fn integer_parameter_roundtrips() {
        assert_eq!(LinkerParameter::Integer(42).as_integer(), 42);
    }
}
