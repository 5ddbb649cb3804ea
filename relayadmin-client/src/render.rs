//! Plain-text tables for the `status` and `history` commands.

use relayadmin_core::{
    ActiveConnection, DEFAULT_DECIMALS, HistoryStatistic, RespHistoryStatistic, format_bytes,
    format_duration,
};

const COLUMN_GAP: &str = "  ";

pub fn render_active_connections(connections: &[ActiveConnection]) -> String {
    if connections.is_empty() {
        return "no active connections\n".to_owned();
    }

    let header = [
        "ID", "NAME", "ADDRESS", "RELAYING", "CONNECTED", "LAST ACTIVE", "RELAYS", "ERRORS",
        "OFFLINE", "DURATION", "BYTES",
    ];
    let rows = connections
        .iter()
        .map(|conn| {
            let mut row = vec![
                conn.id.clone(),
                conn.custom_name.clone(),
                conn.req_addr.clone(),
                if conn.relaying { "yes" } else { "no" }.to_owned(),
                conn.connect_time.clone(),
                conn.last_active.clone(),
            ];
            row.extend(counter_cells(&conn.history));
            row
        })
        .collect::<Vec<_>>();

    render_table(&header, &rows)
}

pub fn render_history_page(page: &RespHistoryStatistic) -> String {
    let header = [
        "ID", "NAME", "RELAYS", "ERRORS", "OFFLINE", "DURATION", "BYTES", "UPDATED",
    ];
    let rows = page
        .list
        .iter()
        .map(|stat| {
            let mut row = vec![stat.id.clone(), stat.custom_name.clone()];
            row.extend(counter_cells(stat));
            row.push(stat.updated_at.clone());
            row
        })
        .collect::<Vec<_>>();

    let mut out = if rows.is_empty() {
        "no connection history on this page\n".to_owned()
    } else {
        render_table(&header, &rows)
    };
    out.push_str(&format!(
        "page {} of {} ({} total)\n",
        page.page,
        page_count(page.total, page.page_size),
        page.total
    ));
    out
}

fn counter_cells(stat: &HistoryStatistic) -> [String; 5] {
    [
        stat.total_relay_count.to_string(),
        stat.total_relay_err_count.to_string(),
        stat.total_relay_offline_count.to_string(),
        format_duration(Some(stat.total_relay_ms as f64)),
        format_bytes(Some(stat.total_relay_bytes as f64), DEFAULT_DECIMALS),
    ]
}

fn page_count(total: i64, page_size: u32) -> i64 {
    if total <= 0 || page_size == 0 {
        return 1;
    }
    let size = i64::from(page_size);
    (total + size - 1) / size
}

fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = header
        .iter()
        .map(|h| h.chars().count())
        .collect::<Vec<_>>();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    push_line(&mut out, header.iter().copied(), &widths);
    for row in rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let mut line = String::new();
    for (index, (cell, width)) in cells.zip(widths).enumerate() {
        if index > 0 {
            line.push_str(COLUMN_GAP);
        }
        line.push_str(cell);
        let pad = width.saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat_n(' ', pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(id: &str, bytes: i64, ms: i64) -> HistoryStatistic {
        HistoryStatistic {
            id: id.to_owned(),
            custom_name: String::new(),
            created_at: "2025-04-01T10:00:00Z".to_owned(),
            updated_at: "2025-04-02T10:00:00Z".to_owned(),
            total_relay_count: 4,
            total_relay_err_count: 0,
            total_relay_offline_count: 1,
            total_relay_ms: ms,
            total_relay_bytes: bytes,
        }
    }

    #[test]
    fn active_table_humanises_counters() {
        let conn = ActiveConnection {
            id: "conn-1".to_owned(),
            custom_name: "office".to_owned(),
            req_addr: "10.0.0.2:5000".to_owned(),
            connect_time: "2025-04-01T10:00:00Z".to_owned(),
            last_active: "2025-04-01T10:05:00Z".to_owned(),
            relaying: true,
            history: stat("conn-1", 1024, 61_000),
        };
        let table = render_active_connections(&[conn]);
        let lines = table.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("office"));
        assert!(lines[1].contains("yes"));
        assert!(lines[1].contains("1m 1s"));
        assert!(lines[1].ends_with("1.00 KB"));
    }

    #[test]
    fn columns_line_up() {
        let page = RespHistoryStatistic {
            list: vec![stat("a", 0, 500), stat("a-much-longer-id", 2048, 3_661_000)],
            total: 2,
            page: 1,
            page_size: 10,
        };
        let table = render_history_page(&page);
        let lines = table.lines().collect::<Vec<_>>();
        assert_eq!(&lines[2][..16], "a-much-longer-id");
        assert_eq!(lines[0].find("RELAYS"), lines[1].find('4'));
        assert_eq!(lines.last().copied(), Some("page 1 of 1 (2 total)"));
    }

    #[test]
    fn empty_results_are_explicit() {
        assert_eq!(render_active_connections(&[]), "no active connections\n");
        let page = RespHistoryStatistic {
            list: Vec::new(),
            total: 45,
            page: 9,
            page_size: 10,
        };
        let out = render_history_page(&page);
        assert!(out.starts_with("no connection history"));
        assert!(out.ends_with("page 9 of 5 (45 total)\n"));
    }
}
