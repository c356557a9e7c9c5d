use crate::{quote_ident, Db, SanityOptions, SanityReport};
use anyhow::Result;

impl Db {
    /// Rewrite parseable date values to canonical `YYYY-MM-DD`. Values SQLite
    /// cannot parse are left untouched. Returns the number of rows changed.
    pub fn normalize_dates(&self, table: &str, column: &str) -> Result<usize> {
        let (t, c) = (quote_ident(table)?, quote_ident(column)?);
        let sql = format!(
            "UPDATE {t} SET {c} = date({c}) \
             WHERE {c} IS NOT NULL AND trim({c}) <> '' AND date({c}) IS NOT NULL AND {c} <> date({c})"
        );
        Ok(self.conn.execute(&sql, [])?)
    }

    /// Post-provision check. Only an invalid table/column name or a failed
    /// existence probe is an error; failures of the individual steps land in
    /// `warnings` so the caller decides how strict to be.
    pub fn sanity_check(&self, opts: &SanityOptions) -> Result<SanityReport> {
        quote_ident(&opts.table)?;
        if let Some(c) = &opts.date_column {
            quote_ident(c)?;
        }
        let mut report = SanityReport { table: opts.table.clone(), ..SanityReport::default() };
        report.present = self.table_exists(&opts.table)?;
        if !report.present {
            return Ok(report);
        }

        let date_column = match &opts.date_column {
            Some(c) => match self.column_exists(&opts.table, c) {
                Ok(true) => Some(c.as_str()),
                Ok(false) => {
                    report.warnings.push(format!("column {}.{} not found", opts.table, c));
                    None
                }
                Err(e) => {
                    report.warnings.push(format!("inspect columns: {e}"));
                    None
                }
            },
            None => None,
        };

        if let (true, Some(c)) = (opts.normalize_dates, date_column) {
            match self.normalize_dates(&opts.table, c) {
                Ok(n) => report.normalized = Some(n),
                Err(e) => report.warnings.push(format!("normalize dates: {e}")),
            }
        }
        match self.row_count(&opts.table) {
            Ok(n) => report.rows = Some(n),
            Err(e) => report.warnings.push(format!("row count: {e}")),
        }
        if let Some(c) = date_column {
            match self.date_span(&opts.table, c) {
                Ok(span) => report.span = Some(span),
                Err(e) => report.warnings.push(format!("date span: {e}")),
            }
        }
        Ok(report)
    }
}
