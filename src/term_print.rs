use anyhow::Result;
use audit_filter::{FilterSummary, PolicyEntry};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::replay::ReplayOutcome;

pub struct TermPrinted;

pub trait TermPrintable {
    fn term_print(&self) -> Result<TermPrinted>;
}

impl TermPrintable for String {
    fn term_print(&self) -> Result<TermPrinted> {
        println!("{self}");
        Ok(TermPrinted)
    }
}

impl TermPrintable for Vec<FilterSummary> {
    fn term_print(&self) -> Result<TermPrinted> {
        let mut table = table();

        table.set_header(header(&["ID", "OP", "TAG", "REFS", "DEFINITION"]));

        for summary in self {
            let definition = &summary.definition;
            table.add_row(vec![
                Cell::new(definition.id)
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new(definition.op()),
                Cell::new(definition.tag.as_deref().unwrap_or("")),
                Cell::new(summary.refcount),
                Cell::new(&definition.body),
            ]);
        }

        println!("{table}");
        Ok(TermPrinted)
    }
}

impl TermPrintable for Vec<PolicyEntry> {
    fn term_print(&self) -> Result<TermPrinted> {
        let mut table = table();

        table.set_header(header(&["CLASS", "CODE", "ACTION", "FILTER"]));

        for entry in self {
            let filter = entry
                .filter
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());

            table.add_row(vec![
                Cell::new(entry.class)
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new(entry.class.code()),
                Cell::new(entry.action),
                Cell::new(filter),
            ]);
        }

        println!("{table}");
        Ok(TermPrinted)
    }
}

impl TermPrintable for Vec<ReplayOutcome> {
    fn term_print(&self) -> Result<TermPrinted> {
        let mut table = table();

        table.set_header(header(&["LINE", "CLASS", "EVENT", "ACTION", "TAG"]));

        for outcome in self {
            let (action, color) = match &outcome.error {
                Some(error) => (format!("error: {error}"), Color::Red),
                None if outcome.actions.logs() => (outcome.actions.to_string(), Color::Green),
                None => (outcome.actions.to_string(), Color::White),
            };

            table.add_row(vec![
                Cell::new(outcome.line),
                Cell::new(outcome.class).fg(Color::Cyan),
                Cell::new(&outcome.event),
                Cell::new(action).fg(color).add_attribute(Attribute::Bold),
                Cell::new(outcome.event.tag().unwrap_or("")),
            ]);
        }

        println!("{table}");
        Ok(TermPrinted)
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table
}
