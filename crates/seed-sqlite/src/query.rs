use crate::{quote_ident, DateSpan, Db};
use anyhow::Result;

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM pragma_table_info(?1) WHERE name=?2",
            [table, column],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    pub fn date_span(&self, table: &str, column: &str) -> Result<DateSpan> {
        let (t, c) = (quote_ident(table)?, quote_ident(column)?);
        let sql = format!("SELECT MIN({c}), MAX({c}) FROM {t} WHERE {c} IS NOT NULL AND trim({c}) <> ''");
        let (min, max) = self.conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(DateSpan { min, max })
    }
}
