use owo_colors::{OwoColorize, Style as OwoStyle};

#[derive(Debug, Clone, Copy)]
enum Tone {
    Heading,
    Success,
    Warning,
    Muted,
    Value,
}

impl Tone {
    fn style(self) -> OwoStyle {
        match self {
            Self::Heading => OwoStyle::new().bold().cyan(),
            Self::Success => OwoStyle::new().bold().green(),
            Self::Warning => OwoStyle::new().bold().yellow(),
            Self::Muted => OwoStyle::new().dimmed(),
            Self::Value => OwoStyle::new().bold(),
        }
    }
}

/// Applies colour to probe output when stdout is a terminal.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Heading)
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Success)
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Warning)
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Muted)
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), Tone::Value)
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_string()
        }
    }
}
