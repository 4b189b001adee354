pub mod search;
pub mod sync;

use crate::error::SyncError;
use clap::ValueEnum;

/// 命令输出格式
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), SyncError> {
    let text = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{text}");
    Ok(())
}
