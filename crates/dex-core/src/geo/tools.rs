//! External conversion tool invocation
//!
//! The geographic formats are produced by GDAL's `ogr2ogr` and by
//! `tippecanoe`, both expected on PATH. The binary locations can be
//! overridden through environment variables, which the tests use to point
//! at stub scripts.

use tokio::process::Command;
use tracing::debug;

use crate::error::{ExportError, Result};

/// Environment override for the GDAL converter binary
pub const OGR2OGR_ENV: &str = "DEX_OGR2OGR_BIN";
/// Environment override for the vector tile builder binary
pub const TIPPECANOE_ENV: &str = "DEX_TIPPECANOE_BIN";

/// Lines of tool stderr kept in error messages
const STDERR_LINES: usize = 10;

/// Resolved conversion tool binaries
///
/// Injectable so tests can point at stub scripts instead of mutating the
/// process environment.
#[derive(Debug, Clone)]
pub struct ToolChain {
    pub ogr2ogr: String,
    pub tippecanoe: String,
}

impl ToolChain {
    pub fn from_env() -> Self {
        Self {
            ogr2ogr: std::env::var(OGR2OGR_ENV).unwrap_or_else(|_| "ogr2ogr".to_string()),
            tippecanoe: std::env::var(TIPPECANOE_ENV).unwrap_or_else(|_| "tippecanoe".to_string()),
        }
    }
}

impl Default for ToolChain {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Run one conversion tool to completion
///
/// The tool's stdout/stderr are captured, not inherited; on failure the
/// tail of stderr is folded into the error so the log shows what the tool
/// actually complained about.
pub async fn run_tool(bin: &str, args: &[String]) -> Result<()> {
    debug!(tool = bin, ?args, "running conversion tool");
    let output = Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|source| ExportError::ToolSpawn {
            tool: bin.to_string(),
            source,
        })?;
    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("code {code}"),
            None => "a signal".to_string(),
        };
        return Err(ExportError::Tool {
            tool: bin.to_string(),
            status,
            stderr: stderr_excerpt(&output.stderr),
        });
    }
    Ok(())
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let tail = lines.len().saturating_sub(STDERR_LINES);
    lines[tail..].join("\n").trim().to_string()
}
