//! Program model for a simulated debuggee.

use indexmap::IndexMap;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub data_type: SmolStr,
    pub value: String,
}

impl Variable {
    #[must_use]
    pub fn new(data_type: &str, value: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            value: value.into(),
        }
    }
}

/// What a simulated debuggee runs: one source file executed top to bottom
/// inside a single function, with fixed local and global variables.
#[derive(Debug, Clone)]
pub struct DebuggeeScript {
    pub filename: SmolStr,
    pub function: SmolStr,
    pub source: Vec<String>,
    pub locals: IndexMap<SmolStr, Variable>,
    pub globals: IndexMap<SmolStr, Variable>,
    pub features: IndexMap<SmolStr, String>,
    /// `run` keeps the debuggee running until it is paused or finished
    /// through its handle, or the front end sends `break`.
    pub hold_on_run: bool,
}

impl DebuggeeScript {
    #[must_use]
    pub fn new(filename: impl Into<SmolStr>) -> Self {
        Self {
            filename: filename.into(),
            function: "main".into(),
            source: Vec::new(),
            locals: IndexMap::new(),
            globals: IndexMap::new(),
            features: IndexMap::new(),
            hold_on_run: false,
        }
    }

    /// A small counting loop, good enough for demos and tests.
    #[must_use]
    pub fn sample(language: &str) -> Self {
        let extension = match language.to_ascii_lowercase().as_str() {
            "perl" => "pl",
            "php" => "php",
            "tcl" => "tcl",
            "xslt" => "xsl",
            _ => "py",
        };
        let mut script = Self::new(format!("file:///tmp/sample.{extension}"))
            .with_function("compute")
            .with_source([
                "def compute(n):",
                "    total = 0",
                "    for i in range(n):",
                "        total += i",
                "    return total",
                "",
                "print(compute(4))",
            ])
            .with_local("n", "int", "4")
            .with_local("total", "int", "0")
            .with_global("__name__", "str", "__main__");
        script
            .features
            .insert("language_name".into(), language.to_ascii_lowercase());
        script.features.insert("max_depth".into(), "1".into());
        script.features.insert("max_children".into(), "32".into());
        script
    }

    #[must_use]
    pub fn with_function(mut self, function: &str) -> Self {
        self.function = function.into();
        self
    }

    #[must_use]
    pub fn with_source<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source = lines.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_local(mut self, name: &str, data_type: &str, value: &str) -> Self {
        self.locals.insert(name.into(), Variable::new(data_type, value));
        self
    }

    #[must_use]
    pub fn with_global(mut self, name: &str, data_type: &str, value: &str) -> Self {
        self.globals.insert(name.into(), Variable::new(data_type, value));
        self
    }

    #[must_use]
    pub fn hold_on_run(mut self) -> Self {
        self.hold_on_run = true;
        self
    }

    #[must_use]
    pub fn line_count(&self) -> u32 {
        u32::try_from(self.source.len()).unwrap_or(u32::MAX)
    }
}
