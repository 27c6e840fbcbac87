use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DesignError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Infeasible design: {requested} runs requested but only {available} distinct sorted rows exist")]
    InfeasibleDesign { requested: usize, available: u128 },

    #[error("Sampling exhausted: found {obtained} of {requested} unique rows after {retries} retries (increase the grid levels or decrease the run count)")]
    SamplingExhaustion {
        requested: usize,
        obtained: usize,
        retries: usize,
    },

    #[error("Builder error: {0}")]
    Builder(String),
}

impl From<derive_builder::UninitializedFieldError> for DesignError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        DesignError::Builder(e.to_string())
    }
}

pub type DesignResult<T> = Result<T, DesignError>;
