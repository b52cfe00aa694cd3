use grammar::Modifier;

/// Lexical settings for matching terminals.
///
/// A parser starts every parse with its global `LexConfig`. Rule modifiers
/// override it for the rule and everything the rule calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexConfig {
    /// Compare literals and regexes case-insensitively.
    pub ignore_case: bool,
    /// Skip whitespace (and `Comment` matches) before each terminal.
    pub skipws: bool,
    /// Characters treated as whitespace.
    pub ws: String,
    /// Keyword-like literals must not be followed by a word character.
    pub autokwd: bool,
}

impl Default for LexConfig {
    fn default() -> Self {
        LexConfig {
            ignore_case: false,
            skipws: true,
            ws: " \t\n\r".to_owned(),
            autokwd: false,
        }
    }
}

impl LexConfig {
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn skipws(mut self, skipws: bool) -> Self {
        self.skipws = skipws;
        self
    }

    pub fn ws(mut self, ws: impl Into<String>) -> Self {
        self.ws = ws.into();
        self
    }

    pub fn autokwd(mut self, autokwd: bool) -> Self {
        self.autokwd = autokwd;
        self
    }
}

/// The configuration in effect while a rule body runs. Borrows whitespace
/// sets from the compiled parser so it can be copied on every rule call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveConfig<'p> {
    pub ignore_case: bool,
    pub skipws: bool,
    pub ws: &'p str,
    pub autokwd: bool,
}

impl<'p> ActiveConfig<'p> {
    pub fn new(config: &'p LexConfig) -> Self {
        ActiveConfig {
            ignore_case: config.ignore_case,
            skipws: config.skipws,
            ws: &config.ws,
            autokwd: config.autokwd,
        }
    }

    /// Layers rule modifiers on top of this configuration.
    pub fn apply(mut self, modifiers: &'p [Modifier]) -> Self {
        for modifier in modifiers {
            match modifier {
                Modifier::SkipWs => self.skipws = true,
                Modifier::NoSkipWs => self.skipws = false,
                Modifier::Ws(ws) => self.ws = ws,
                Modifier::IgnoreCase => self.ignore_case = true,
                Modifier::MatchCase => self.ignore_case = false,
                Modifier::AutoKwd => self.autokwd = true,
                Modifier::NoAutoKwd => self.autokwd = false,
            }
        }
        self
    }

    pub fn is_ws(&self, c: char) -> bool {
        self.ws.contains(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_override_in_order() {
        let base = LexConfig::default().autokwd(true);
        let mods = vec![
            Modifier::NoSkipWs,
            Modifier::Ws("-".to_owned()),
            Modifier::IgnoreCase,
            Modifier::NoAutoKwd,
        ];
        let active = ActiveConfig::new(&base).apply(&mods);
        assert!(!active.skipws);
        assert!(active.ignore_case);
        assert!(!active.autokwd);
        assert!(active.is_ws('-'));
        assert!(!active.is_ws(' '));

        let restore = vec![Modifier::SkipWs, Modifier::MatchCase];
        let back = active.apply(&restore);
        assert!(back.skipws);
        assert!(!back.ignore_case);
    }
}
