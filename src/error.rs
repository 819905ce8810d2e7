//! Error types for the sampling engine.
//!
//! Every variant names the table, column or pattern it concerns. Connection
//! strings and passwords never reach these messages.

use thiserror::Error;

/// Main error type for sampling operations.
#[derive(Error, Debug)]
pub enum SampleError {
    /// The dependency graph cannot be turned into a valid emission order
    #[error("Structural dependency error on {table}: {message}")]
    StructuralDependency { table: String, message: String },

    /// Missing SELECT/USAGE/CREATE privilege
    #[error("Permission denied on {object}: {message}")]
    Permission { object: String, message: String },

    /// Malformed limit or exclusion rule
    #[error("Invalid rule '{rule}': {message}")]
    RuleValidation { rule: String, message: String },

    /// Post-sample verification found a dangling reference
    #[error("Referential integrity violation: {table}.{constraint} references missing row(s) in {referenced}: {message}")]
    ReferentialIntegrity {
        table: String,
        constraint: String,
        referenced: String,
        message: String,
    },

    /// Scratch schema collision, timeout or similar resource problem
    #[error("Resource error on {resource}: {message}")]
    Resource { resource: String, message: String },

    /// Connection or transaction failure
    #[error("Database error: {0}")]
    Connection(#[from] postgres::Error),

    /// Query failure attributed to a specific table
    #[error("Query failed for {table}: {message}")]
    Query { table: String, message: String },

    /// Configuration value that cannot be honoured
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (output file, audit file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was cancelled between round trips
    #[error("Sampling cancelled")]
    Cancelled,
}

impl SampleError {
    /// Create a StructuralDependency error
    pub fn structural(table: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::StructuralDependency {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Permission error
    pub fn permission(object: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::Permission {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a RuleValidation error
    pub fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::RuleValidation {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a Resource error
    pub fn resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::Resource {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a Query error
    pub fn query(table: impl Into<String>, message: impl Into<String>) -> Self {
        SampleError::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            SampleError::Connection(_) => 2,
            SampleError::Permission { .. } => 3,
            SampleError::ReferentialIntegrity { .. } => 4,
            SampleError::RuleValidation { .. } | SampleError::Config(_) => 5,
            SampleError::Io(_) => 6,
            SampleError::Cancelled => 7,
            SampleError::StructuralDependency { .. } => 8,
            SampleError::Resource { .. } => 9,
            SampleError::Query { .. } | SampleError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\n  Caused by ({}): {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sampling operations.
pub type Result<T> = std::result::Result<T, SampleError>;
