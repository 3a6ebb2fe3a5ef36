use time::{format_description::FormatItem, macros::format_description, UtcOffset};
use tracing::warn;

use super::LedgerError;
use crate::store::WithdrawalRequest;

pub const DELIMITER: char = ',';
pub const HEADER: [&str; 4] = ["Username", "User ID", "Amount", "Date"];

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Renders records as delimiter-joined rows under a fixed header.
/// Fields are not quoted; a field containing the delimiter yields a
/// malformed row and is logged.
pub fn export_as_delimited_text(
    records: &[WithdrawalRequest],
    offset: UtcOffset,
) -> Result<String, LedgerError> {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(HEADER.join(&DELIMITER.to_string()));

    for record in records {
        let date = record
            .created_at
            .to_offset(offset)
            .format(DATE_FORMAT)
            .map_err(|e| LedgerError::Export(e.to_string()))?;
        let fields = [
            record.external_username.clone(),
            record.external_id.clone(),
            record.amount.normalize().to_string(),
            date,
        ];
        if fields.iter().any(|f| f.contains(DELIMITER)) {
            warn!(withdrawal_id = %record.id, "export field contains delimiter");
        }
        lines.push(fields.join(&DELIMITER.to_string()));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::{datetime, offset};
    use uuid::Uuid;

    use super::*;

    fn record(username: &str, amount: rust_decimal::Decimal) -> WithdrawalRequest {
        WithdrawalRequest {
            id: Uuid::new_v4(),
            external_username: username.into(),
            external_id: "156".into(),
            amount,
            created_at: datetime!(2024-05-01 23:30:05 UTC),
        }
    }

    #[test]
    fn empty_ledger_is_header_only() {
        assert_eq!(
            export_as_delimited_text(&[], UtcOffset::UTC).unwrap(),
            "Username,User ID,Amount,Date"
        );
    }

    #[test]
    fn rows_follow_fixed_column_order() {
        let out = export_as_delimited_text(
            &[record("builderman", dec!(10)), record("noob", dec!(7.5))],
            UtcOffset::UTC,
        )
        .unwrap();
        assert_eq!(
            out,
            "Username,User ID,Amount,Date\n\
             builderman,156,10,2024-05-01 23:30:05\n\
             noob,156,7.5,2024-05-01 23:30:05"
        );
    }

    #[test]
    fn stored_scale_does_not_leak_into_amounts() {
        let out = export_as_delimited_text(
            &[record("builderman", dec!(10.00)), record("noob", dec!(7.50))],
            UtcOffset::UTC,
        )
        .unwrap();
        let amounts: Vec<_> = out
            .lines()
            .skip(1)
            .map(|row| row.split(DELIMITER).nth(2).unwrap())
            .collect();
        assert_eq!(amounts, vec!["10", "7.5"]);
    }

    #[test]
    fn dates_render_in_configured_offset() {
        let out = export_as_delimited_text(&[record("builderman", dec!(10))], offset!(+2)).unwrap();
        assert!(out.ends_with("2024-05-02 01:30:05"));
    }

    #[test]
    fn delimiter_in_field_is_not_escaped() {
        let out = export_as_delimited_text(&[record("a,b", dec!(7))], UtcOffset::UTC).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert_eq!(row.split(DELIMITER).count(), 5);
    }
}
