//! Daily CSV journal of closed trades (`trades_YYYY-MM-DD.csv`)

use anyhow::{Context, Result};
use chrono::Utc;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::bot::TradeRecord;
use crate::types::GroupId;

/// One CSV row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRow {
    pub timestamp: i64,
    pub group: String,
    pub bot_id: String,
    pub symbol: String,
    pub side: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub leverage: u32,
    pub bet_amount: f64,
    pub pnl_percent: f64,
    pub pnl_value: f64,
    pub exit_reason: String,
    pub cycle: u64,
}

impl JournalRow {
    pub fn from_trade(group: GroupId, trade: &TradeRecord) -> Self {
        Self {
            timestamp: trade.closed_at.timestamp(),
            group: group.to_string(),
            bot_id: trade.bot_id.clone(),
            symbol: trade.symbol.clone(),
            side: trade.side.to_string(),
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            leverage: trade.leverage,
            bet_amount: trade.bet_amount,
            pnl_percent: trade.pnl_percent,
            pnl_value: trade.pnl_value,
            exit_reason: trade.reason.to_string(),
            cycle: trade.cycle,
        }
    }
}

/// Appends closed trades to the day's CSV file
#[derive(Debug, Clone)]
pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn today_path(&self) -> PathBuf {
        self.dir
            .join(format!("trades_{}.csv", Utc::now().format("%Y-%m-%d")))
    }

    fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
        let file_has_data =
            path.exists() && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open trade journal {}", path.display()))?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    /// Append every row; a header is written only when the file is new or empty
    pub fn append(&self, rows: &[JournalRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).context("Failed to create journal directory")?;
        let mut writer = Self::create_writer(&self.today_path())?;
        for row in rows {
            writer
                .serialize(row)
                .context("Failed to write trade journal row")?;
        }
        writer.flush().context("Failed to flush trade journal")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{ExitReason, Side};
    use csv::ReaderBuilder;

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            bot_id: "eco-ALPHA-genesis-0-abcd1234".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 102.0,
            leverage: 10,
            bet_amount: 5.0,
            pnl_percent: 20.0,
            pnl_value: pnl,
            reason: ExitReason::TakeProfit,
            cycle: 4,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn test_header_written_once_across_appends() {
        let dir = std::env::temp_dir().join(format!("evoarena_journal_{}", uuid::Uuid::new_v4()));
        let journal = TradeJournal::new(&dir);

        journal
            .append(&[JournalRow::from_trade(GroupId::Alpha, &trade(1.0))])
            .unwrap();
        journal
            .append(&[JournalRow::from_trade(GroupId::Beta, &trade(-0.5))])
            .unwrap();

        let content = fs::read_to_string(journal.today_path()).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with("timestamp,")).count(), 1);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        let rows: Vec<JournalRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group, "ALPHA");
        assert_eq!(rows[1].pnl_value, -0.5);
        let _ = fs::remove_dir_all(&dir);
    }
}
