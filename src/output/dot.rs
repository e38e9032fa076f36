use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use crate::basic_types::Sequence;

/// Writes the operation DAG of `sequence` as a DOT digraph: one node
/// per operation, one edge from every operation to its consumer.
pub fn write_dot(sequence: &Sequence, path: &Path) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "digraph G {{")?;
    for (idx, op) in sequence.iter().enumerate() {
        writeln!(out, "  {idx} [label=\"{op}\"]")?;
    }

    for producer in 0..sequence.len() {
        for consumer in 0..sequence.len() {
            if sequence[consumer].consumes(&sequence[producer]) {
                writeln!(out, "  {producer} -> {consumer}")?;
            }
        }
    }

    writeln!(out, "}}")?;
    out.flush()
}
