use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::parse::fields;
use crate::portfolio::BondRecord;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

/// Class marker on the source table's totals row. That row is a sum of the
/// others, not a bond; it must never reach the aggregates.
const TOTALS_ROW_MARKER: &str = "totalsRow";

/// Typed identity of a table column. Cells are routed to the normalizer by
/// this, never by raw header strings at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    IssueDate,
    Maturity,
    PutDate,
    EarliestCall,
    Price,
    Coupon,
    Notional,
    MarketValue,
    BtcPar,
    RefPrice,
    ConversionPrice,
    Unknown,
}

fn resolve_column(label: &str) -> Column {
    match label.trim() {
        "Name" => Column::Name,
        "Issue Date" => Column::IssueDate,
        "Maturity" => Column::Maturity,
        "Put Date" => Column::PutDate,
        "Earliest Call Date" => Column::EarliestCall,
        "Price" => Column::Price,
        "Coupon" => Column::Coupon,
        "Notional ($M)" => Column::Notional,
        "Market Val ($M)" => Column::MarketValue,
        "BTC Par" => Column::BtcPar,
        "Ref Price" => Column::RefPrice,
        "Conversion Price" => Column::ConversionPrice,
        _ => Column::Unknown,
    }
}

/// Column identity for one header cell. The aria-label attribute is the
/// canonical source; visible text is the fallback. Header text in the wild
/// is abbreviated or restyled across vintages, the label attribute is not.
fn resolve_header(th: &ElementRef) -> Column {
    match th.value().attr("aria-label") {
        Some(label) => match resolve_column(label) {
            Column::Unknown => resolve_column(&cell_text(th)),
            column => column,
        },
        None => resolve_column(&cell_text(th)),
    }
}

/// Whitespace-normalized text content of an element.
fn cell_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector(css: &str) -> Selector {
    // The selectors here are fixed literals; parse cannot fail at runtime.
    Selector::parse(css).unwrap_or_else(|_| unreachable!("bad selector literal: {css}"))
}

/// Parse the debt table out of an HTML document into typed bond records,
/// in source row order (NOT maturity-sorted -- callers sort when they need
/// order, the maturity analyzer does so on construction).
///
/// Structural problems (no table, no header row, a required column missing)
/// abort the parse. A single cell that fails to convert is absorbed: the
/// field becomes absent, a warning is logged, and the parse continues.
pub fn parse_debt_table(html: &str) -> AnalyzerResult<Vec<BondRecord>> {
    let document = Html::parse_document(html);

    let table = document
        .select(&selector("table"))
        .next()
        .ok_or_else(|| AnalyzerError::Structure("no table found in document".into()))?;

    let header_row = table
        .select(&selector("thead tr"))
        .next()
        .ok_or_else(|| AnalyzerError::Structure("table has no header row".into()))?;

    let columns: Vec<Column> = header_row
        .select(&selector("th"))
        .map(|th| resolve_header(&th))
        .collect();

    if columns.is_empty() {
        return Err(AnalyzerError::Structure("header row has no cells".into()));
    }
    for required in [Column::Notional, Column::Maturity] {
        if !columns.contains(&required) {
            return Err(AnalyzerError::Structure(format!(
                "required column missing from header: {required:?}"
            )));
        }
    }

    let td = selector("td");
    let mut bonds = Vec::new();

    for row in table.select(&selector("tbody > tr")) {
        if row
            .value()
            .classes()
            .any(|class| class.contains(TOTALS_ROW_MARKER))
        {
            continue;
        }

        let cells: Vec<String> = row.select(&td).map(|cell| cell_text(&cell)).collect();
        if cells.is_empty() {
            continue;
        }

        bonds.push(build_record(&columns, &cells));
    }

    Ok(bonds)
}

/// Route each cell through the normalizer by its column identity.
/// Extra cells beyond the header width are ignored; short rows leave the
/// remaining fields absent.
fn build_record(columns: &[Column], cells: &[String]) -> BondRecord {
    let mut record = BondRecord::default();

    for (column, raw) in columns.iter().zip(cells) {
        match column {
            Column::Name => record.name = raw.clone(),
            Column::IssueDate => record.issue_date = absorb_date(*column, raw),
            Column::Maturity => record.maturity_date = absorb_date(*column, raw),
            Column::PutDate => record.put_date = absorb_date(*column, raw),
            Column::EarliestCall => record.earliest_call_date = absorb_date(*column, raw),
            Column::Price => record.price = absorb_currency(*column, raw),
            Column::Coupon => record.coupon_pct = absorb_percentage(*column, raw),
            Column::Notional => record.notional_musd = absorb_currency(*column, raw),
            Column::MarketValue => record.market_value_musd = absorb_currency(*column, raw),
            Column::BtcPar => record.btc_par = absorb_currency(*column, raw),
            Column::RefPrice => record.reference_price = absorb_currency(*column, raw),
            Column::ConversionPrice => record.conversion_price = absorb_currency(*column, raw),
            Column::Unknown => {}
        }
    }

    repair_invariants(&mut record);
    record
}

fn absorb_currency(column: Column, raw: &str) -> Option<f64> {
    absorb(column, fields::parse_currency(raw))
}

fn absorb_percentage(column: Column, raw: &str) -> Option<f64> {
    absorb(column, fields::parse_percentage(raw))
}

fn absorb_date(column: Column, raw: &str) -> Option<NaiveDate> {
    absorb(column, fields::parse_date(raw))
}

/// A malformed cell becomes a typed absent, not a crash and not a zero.
fn absorb<T>(column: Column, parsed: AnalyzerResult<Option<T>>) -> Option<T> {
    match parsed {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(column = ?column, error = %e, "cell absorbed as absent");
            None
        }
    }
}

/// Record-level repair: a field value violating its own range is downgraded
/// to absent; a maturity/issue ordering violation drops the issue date.
fn repair_invariants(record: &mut BondRecord) {
    if let Some(notional) = record.notional_musd {
        if notional < 0.0 {
            tracing::warn!(bond = %record.name, notional, "negative notional dropped");
            record.notional_musd = None;
        }
    }
    if let Some(coupon) = record.coupon_pct {
        if !(0.0..=100.0).contains(&coupon) {
            tracing::warn!(bond = %record.name, coupon, "coupon outside [0, 100] dropped");
            record.coupon_pct = None;
        }
    }
    if let (Some(issued), Some(matures)) = (record.issue_date, record.maturity_date) {
        if matures <= issued {
            tracing::warn!(bond = %record.name, "maturity not after issue date, issue date dropped");
            record.issue_date = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TABLE: &str = r#"
        <html><body>
        <table>
          <thead>
            <tr>
              <th aria-label="Name">Name</th>
              <th aria-label="Issue Date">Issued</th>
              <th aria-label="Maturity">Mat.</th>
              <th aria-label="Put Date">Put</th>
              <th aria-label="Coupon">Cpn</th>
              <th aria-label="Notional ($M)">Notional</th>
              <th aria-label="Conversion Price">Conv.</th>
            </tr>
          </thead>
          <tbody>
            <tr>
              <td>2028 Convert</td>
              <td>09/15/2021</td>
              <td>09/15/2028</td>
              <td>\u{2014}</td>
              <td>0.00%</td>
              <td>$1,010</td>
              <td>$183.19</td>
            </tr>
            <tr>
              <td>2030 Convert</td>
              <td>03/05/2024</td>
              <td>03/15/2030</td>
              <td>09/15/2028</td>
              <td>0.625%</td>
              <td>$800</td>
              <td>$149.77</td>
            </tr>
            <tr class="totalsRow">
              <td>Total</td>
              <td>\u{2014}</td>
              <td>\u{2014}</td>
              <td>\u{2014}</td>
              <td>\u{2014}</td>
              <td>$1,810</td>
              <td>\u{2014}</td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "#;

    fn sample() -> String {
        SAMPLE_TABLE.replace("\\u{2014}", "\u{2014}")
    }

    #[test]
    fn test_parses_rows_in_source_order() {
        let bonds = parse_debt_table(&sample()).unwrap();
        assert_eq!(bonds.len(), 2);
        assert_eq!(bonds[0].name, "2028 Convert");
        assert_eq!(bonds[1].name, "2030 Convert");
        assert_eq!(bonds[0].notional_musd, Some(1010.0));
        assert_eq!(bonds[0].coupon_pct, Some(0.0));
        assert_eq!(
            bonds[1].maturity_date,
            NaiveDate::from_ymd_opt(2030, 3, 15)
        );
    }

    #[test]
    fn test_totals_row_never_materialized() {
        let bonds = parse_debt_table(&sample()).unwrap();
        assert!(
            bonds.iter().all(|b| b.name != "Total"),
            "totals row must not become a record"
        );
    }

    #[test]
    fn test_em_dash_is_absent_not_zero() {
        let bonds = parse_debt_table(&sample()).unwrap();
        assert_eq!(bonds[0].put_date, None);
    }

    #[test]
    fn test_aria_label_preferred_over_text() {
        // Header text is abbreviated ("Cpn", "Mat.") -- resolution must come
        // from the label attribute.
        let bonds = parse_debt_table(&sample()).unwrap();
        assert!(bonds[0].coupon_pct.is_some());
        assert!(bonds[0].maturity_date.is_some());
    }

    #[test]
    fn test_text_fallback_without_aria_label() {
        let html = r#"
            <table>
              <thead><tr><th>Name</th><th>Maturity</th><th>Notional ($M)</th></tr></thead>
              <tbody><tr><td>2029 Convert</td><td>06/15/2029</td><td>$3,000</td></tr></tbody>
            </table>
        "#;
        let bonds = parse_debt_table(html).unwrap();
        assert_eq!(bonds[0].notional_musd, Some(3000.0));
    }

    #[test]
    fn test_unparseable_date_absorbed_not_fatal() {
        let html = r#"
            <table>
              <thead><tr><th>Name</th><th>Maturity</th><th>Notional ($M)</th></tr></thead>
              <tbody><tr><td>Bad Date Bond</td><td>June 2029</td><td>$500</td></tr></tbody>
            </table>
        "#;
        let bonds = parse_debt_table(html).unwrap();
        assert_eq!(bonds.len(), 1, "row survives a malformed date cell");
        assert_eq!(bonds[0].maturity_date, None);
        assert_eq!(bonds[0].notional_musd, Some(500.0));
    }

    #[test]
    fn test_missing_table_is_structure_error() {
        let err = parse_debt_table("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(matches!(err, AnalyzerError::Structure(_)), "got {err}");
    }

    #[test]
    fn test_missing_header_row_is_structure_error() {
        let html = "<table><tbody><tr><td>x</td></tr></tbody></table>";
        let err = parse_debt_table(html).unwrap_err();
        assert!(matches!(err, AnalyzerError::Structure(_)), "got {err}");
    }

    #[test]
    fn test_missing_required_column_is_structure_error() {
        let html = r#"
            <table>
              <thead><tr><th>Name</th><th>Coupon</th></tr></thead>
              <tbody><tr><td>x</td><td>1%</td></tr></tbody>
            </table>
        "#;
        let err = parse_debt_table(html).unwrap_err();
        assert!(matches!(err, AnalyzerError::Structure(_)), "got {err}");
    }

    #[test]
    fn test_invariant_repair_downgrades_fields() {
        let html = r#"
            <table>
              <thead><tr><th>Name</th><th>Issue Date</th><th>Maturity</th><th>Coupon</th><th>Notional ($M)</th></tr></thead>
              <tbody><tr><td>Weird</td><td>09/15/2030</td><td>09/15/2028</td><td>120%</td><td>$-5</td></tr></tbody>
            </table>
        "#;
        let bonds = parse_debt_table(html).unwrap();
        let bond = &bonds[0];
        assert_eq!(bond.notional_musd, None, "negative notional dropped");
        assert_eq!(bond.coupon_pct, None, "out-of-range coupon dropped");
        assert_eq!(bond.issue_date, None, "issue date after maturity dropped");
        assert!(bond.maturity_date.is_some());
    }
}
