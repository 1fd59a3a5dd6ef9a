use crate::inventory::InventoryBatch;
use crate::types::HostResult;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per finding, streamed during the sweep.
    #[default]
    Text,
    /// The full `HostResult` set as a JSON array.
    Json,
    /// Server and application records for the asset inventory.
    Inventory,
}

impl FromStr for OutputFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "inventory" => Ok(OutputFormat::Inventory),
            other => Err(crate::Error::ArgumentError(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

/// Writes the sweep results once every host is done. Text findings are
/// streamed as `ScanEvent`s while the sweep runs, so `Text` writes nothing here.
pub fn write_results<W: Write>(
    format: OutputFormat,
    results: &[HostResult],
    mut out: W,
) -> crate::Result<()> {
    match format {
        OutputFormat::Text => {}
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, results)?;
            writeln!(out)?;
        }
        OutputFormat::Inventory => {
            serde_json::to_writer_pretty(&mut out, &InventoryBatch::from_results(results))?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}
