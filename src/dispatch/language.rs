/// Which strategy handles a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Inline,
    Subprocess,
    Remote,
    Preview,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Subprocess => "subprocess",
            Self::Remote => "remote",
            Self::Preview => "preview",
        }
    }
}

/// Languages served locally. Matching is case-sensitive; anything not listed
/// goes to the remote execution service.
const LOCAL_ROUTES: &[(&str, RouteKind)] = &[
    ("javascript", RouteKind::Inline),
    ("python", RouteKind::Subprocess),
    ("html", RouteKind::Preview),
];

/// Internal language id to the remote service's id. Unlisted ids are
/// forwarded verbatim.
const REMOTE_ALIASES: &[(&str, &str)] = &[
    ("java", "java"),
    ("cpp", "cpp"),
    ("c", "c"),
    ("php", "php"),
    ("ruby", "ruby"),
    ("go", "go"),
];

pub const PREVIEW_MESSAGE: &str = "HTML files are rendered in the preview pane";

pub fn route_for(language: &str) -> RouteKind {
    LOCAL_ROUTES
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, route)| *route)
        .unwrap_or(RouteKind::Remote)
}

pub fn remote_language(language: &str) -> &str {
    REMOTE_ALIASES
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, remote)| *remote)
        .unwrap_or(language)
}

/// How an interpreter binary is invoked for a subprocess language.
#[derive(Debug, Clone)]
pub struct InterpreterSpec {
    pub program: String,
    pub args: Vec<String>,
    pub extension: &'static str,
}

impl InterpreterSpec {
    /// Unbuffered, so output written before a crash or kill still reaches the pipes.
    pub fn python(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["-u".to_string()],
            extension: "py",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InterpreterSpec, RouteKind, remote_language, route_for};

    #[test]
    fn local_languages_route_locally() {
        assert_eq!(route_for("javascript"), RouteKind::Inline);
        assert_eq!(route_for("python"), RouteKind::Subprocess);
        assert_eq!(route_for("html"), RouteKind::Preview);
    }

    #[test]
    fn routing_is_case_sensitive() {
        assert_eq!(route_for("Python"), RouteKind::Remote);
        assert_eq!(route_for("JAVASCRIPT"), RouteKind::Remote);
    }

    #[test]
    fn unknown_languages_fall_back_to_remote() {
        assert_eq!(route_for("java"), RouteKind::Remote);
        assert_eq!(route_for("brainfuck"), RouteKind::Remote);
        assert_eq!(route_for(""), RouteKind::Remote);
    }

    #[test]
    fn remote_aliases_pass_unknown_ids_through() {
        assert_eq!(remote_language("cpp"), "cpp");
        assert_eq!(remote_language("kotlin"), "kotlin");
    }

    #[test]
    fn python_runs_unbuffered() {
        let spec = InterpreterSpec::python("python3");
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-u".to_string()]);
        assert_eq!(spec.extension, "py");
    }
}
