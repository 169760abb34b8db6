//! Output formatting for command results and errors.
//!
//! Results go to stdout, errors to stderr. In JSON mode both are a single
//! pretty-printed document.

use serde::Serialize;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Print a serializable value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    exit_code: i32,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorDetail,
}

/// Stable code and exit code for an error surfaced by a command.
pub fn classify(err: &anyhow::Error) -> (&'static str, i32) {
    err.downcast_ref::<permitdb_core::Error>()
        .map_or(("INTERNAL_ERROR", 1), |core| (core.code(), core.exit_code()))
}

/// Report `err` on stderr and return the exit code to use.
pub fn report_error(err: &anyhow::Error, format: OutputFormat) -> i32 {
    let (code, exit_code) = classify(err);

    if format.is_json() {
        let envelope = ErrorEnvelope {
            success: false,
            error: ErrorDetail {
                code,
                message: format!("{err:#}"),
                exit_code,
            },
        };
        match serde_json::to_string_pretty(&envelope) {
            Ok(rendered) => eprintln!("{rendered}"),
            Err(_) => eprintln!("Error [{code}]: {err:#}"),
        }
    } else {
        eprintln!("Error [{code}]: {err:#}");
    }
    exit_code
}
