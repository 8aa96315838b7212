use thiserror::Error;

/// Errors raised while preparing or running a plot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlotError {
    /// An axis expression could not be parsed. The plot request is aborted
    /// before any traversal starts.
    #[error("cannot parse {axis} axis: {message}")]
    AxisParse { axis: char, message: String },

    /// An interval phase has a non-finite start or end time.
    #[error("invalid time interval: from {start} to {end}")]
    SimulationTiming { start: String, end: String },

    /// No simulation trace is loaded.
    #[error("no simulation trace is loaded")]
    UndefinedSimulation,

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    #[error("no plot setting for parameter {0}")]
    MissingParameterSetting(String),

    #[error("invalid plot settings: {0}")]
    InvalidSettings(String),
}

impl PlotError {
    /// Short, stable name used in user-facing notifications.
    pub fn name(&self) -> &'static str {
        match self {
            PlotError::AxisParse { .. } => "AxisParseError",
            PlotError::SimulationTiming { .. } => "SimulationTimingError",
            PlotError::UndefinedSimulation => "UndefinedSimulationError",
            PlotError::Evaluation(_) => "EvaluationError",
            PlotError::InvalidTrace(_) => "InvalidTraceError",
            PlotError::MissingParameterSetting(_) => "MissingParameterSettingError",
            PlotError::InvalidSettings(_) => "InvalidSettingsError",
        }
    }

    /// Message shown in the transient "plot failed" notification.
    pub fn failure_message(&self) -> String {
        format!("Plot failed: {}({})", self.name(), self)
    }
}

pub type Result<T> = std::result::Result<T, PlotError>;
