// External crates
use tabled::builder::Builder;
use tabled::settings::{Padding, Style};

/// Left-aligned text table: every cell is padded to its column's widest cell plus two
/// spaces, except the last cell of a row which is written as is.
#[derive(Debug, Default)]
pub struct Table {
    builder: Builder,
    rows: usize,
}

const PADDING: usize = 2;

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row<I, T>(&mut self, cells: I)
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.builder
            .push_record(cells.into_iter().map(|c| c.to_string()));
        self.rows += 1;
    }

    pub fn render(self) -> String {
        if self.rows == 0 {
            return String::new();
        }

        let mut table = self.builder.build();
        table
            .with(Style::empty())
            .with(Padding::new(0, PADDING, 0, 0));

        // The last column is padded like the others; drop that fill.
        let mut out = String::new();
        for line in table.to_string().lines() {
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}
