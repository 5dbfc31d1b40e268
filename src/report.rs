use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Status,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    warnings: Vec<String>,
    errors: Vec<String>,
    #[serde(skip)]
    statuses: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("{text}");
    }

    pub fn status(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        self.statuses.push(text);
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("{text}");
        self.warnings.push(text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        error!("{text}");
        self.errors.push(text);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        self.statuses.extend(other.statuses);
    }

    pub fn messages(&self) -> Vec<Message> {
        let warnings = self.warnings.iter().map(|text| Message {
            level: Level::Warning,
            text: text.clone(),
        });
        let errors = self.errors.iter().map(|text| Message {
            level: Level::Error,
            text: text.clone(),
        });
        warnings.chain(errors).collect()
    }
}
