//! Graphviz DOT diagnostic writer.
//!
//! Walks the page graph breadth-first starting at the root, emitting one
//! record-shaped node per page (one field per key) and one edge per cursor.
//! Purely a diagnostic: it never consults the comparator and is the only
//! place in the crate that touches a [`KeyPrinter`].

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use crate::error::{Result, TreeError};
use crate::printer::KeyPrinter;
use crate::storage::paged_file::NULL_PAGE;
use crate::storage::PagedFile;

pub fn write_dot(file: &mut PagedFile, printer: &dyn KeyPrinter, path: &Path) -> Result<()> {
    let mut out = String::from("digraph tree {\n    node [shape=record];\n");

    if file.root_page_num() != NULL_PAGE {
        let mut queue = VecDeque::new();
        let mut seen = std::collections::HashSet::new();
        queue.push_back(file.root_page_num());
        seen.insert(file.root_page_num());

        while let Some(page_num) = queue.pop_front() {
            let page = file.read_page(page_num)?;
            let rec = page.rec_size();
            let fields: Vec<String> = (0..page.keys_count())
                .map(|i| printer.print(page.key(i), rec))
                .collect();
            let label = if fields.is_empty() {
                "(empty)".to_string()
            } else {
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| format!("<f{i}> {f}"))
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            out.push_str(&format!("    p{page_num} [label=\"{label}\"];\n"));

            if !page.is_leaf() {
                for i in 0..=page.keys_count() {
                    let child = page.cursor(i);
                    if child == NULL_PAGE {
                        continue;
                    }
                    let style = if i == 0 || i == page.keys_count() { "dashed" } else { "solid" };
                    out.push_str(&format!("    p{page_num} -> p{child} [style={style}];\n"));
                    if seen.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    out.push_str("}\n");
    let mut f = File::create(path).map_err(TreeError::from)?;
    f.write_all(out.as_bytes()).map_err(TreeError::from)?;
    Ok(())
}
