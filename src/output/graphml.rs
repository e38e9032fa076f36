use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::basic_types::Jacobian;
use crate::basic_types::JacobianChain;
use crate::basic_types::Mode;

/// Writes `chain` as `chain_{length}_{id}.xml` into `output_dir` and
/// returns the path of the written file.
///
/// The graph carries one long-typed `optimized_cost_{t}` entry per
/// thread count, one node per chain endpoint and one directed edge per
/// elemental Jacobian with its sweep costs and tape size.
pub fn write_graphml(output_dir: &Path, chain: &JacobianChain) -> io::Result<PathBuf> {
    let path = output_dir.join(format!("chain_{}_{}.xml", chain.length(), chain.id));
    let mut file = BufWriter::new(File::create(&path)?);

    write_header(&mut file, chain)?;

    for (threads, cost) in chain.optimized_costs.iter().enumerate().skip(1) {
        writeln!(
            file,
            "    <data key=\"optimized_cost_{threads}\">{cost}</data>"
        )?;
    }

    if let Some(first) = chain.elementals().first() {
        write_node(&mut file, first.i, first.n)?;
    }
    for jac in chain.elementals() {
        write_node(&mut file, jac.j, jac.m)?;
    }
    for jac in chain.elementals() {
        write_edge(&mut file, jac)?;
    }

    writeln!(file, "  </graph>")?;
    writeln!(file, "</graphml>")?;
    file.flush()?;

    Ok(path)
}

fn write_header(file: &mut impl Write, chain: &JacobianChain) -> io::Result<()> {
    writeln!(file, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        file,
        "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"http://graphml.graphdrawing.org/xmlns \
         http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd\">"
    )?;

    for threads in 1..chain.optimized_costs.len() {
        writeln!(
            file,
            "  <key id=\"optimized_cost_{threads}\" for=\"graph\" \
             attr.name=\"optimized_cost_{threads}\" attr.type=\"long\" />"
        )?;
    }
    writeln!(
        file,
        "  <key id=\"index\" for=\"node\" attr.name=\"index\" attr.type=\"long\" />"
    )?;
    writeln!(
        file,
        "  <key id=\"size\" for=\"node\" attr.name=\"size\" attr.type=\"long\" />"
    )?;
    writeln!(
        file,
        "  <key id=\"adjoint_cost\" for=\"edge\" attr.name=\"adjoint_cost\" attr.type=\"long\" />"
    )?;
    writeln!(
        file,
        "  <key id=\"tangent_cost\" for=\"edge\" attr.name=\"tangent_cost\" attr.type=\"long\" />"
    )?;
    writeln!(
        file,
        "  <key id=\"adjoint_memory\" for=\"edge\" \
         attr.name=\"adjoint_memory\" attr.type=\"long\" />"
    )?;
    writeln!(
        file,
        "  <key id=\"has_model\" for=\"edge\" attr.name=\"has_model\" attr.type=\"boolean\" />"
    )?;
    writeln!(
        file,
        "  <graph id=\"G\" edgedefault=\"directed\" parse.nodeids=\"free\" \
         parse.edgeids=\"canonical\" parse.order=\"nodesfirst\">"
    )
}

fn write_node(file: &mut impl Write, index: usize, size: usize) -> io::Result<()> {
    writeln!(file, "    <node id=\"{index}\">")?;
    writeln!(file, "      <data key=\"index\">{index}</data>")?;
    writeln!(file, "      <data key=\"size\">{size}</data>")?;
    writeln!(file, "    </node>")
}

fn write_edge(file: &mut impl Write, jac: &Jacobian) -> io::Result<()> {
    writeln!(
        file,
        "    <edge id=\"{}\" source=\"{}\" target=\"{}\">",
        jac.i, jac.i, jac.j
    )?;
    writeln!(
        file,
        "      <data key=\"adjoint_cost\">{}</data>",
        jac.single_evaluation_fma(Mode::Adjoint)
    )?;
    writeln!(
        file,
        "      <data key=\"tangent_cost\">{}</data>",
        jac.single_evaluation_fma(Mode::Tangent)
    )?;
    writeln!(
        file,
        "      <data key=\"adjoint_memory\">{}</data>",
        jac.edges_in_dag
    )?;
    writeln!(file, "      <data key=\"has_model\">1</data>")?;
    writeln!(file, "    </edge>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> JacobianChain {
        let mut first = Jacobian {
            i: 0,
            j: 1,
            n: 2,
            m: 3,
            edges_in_dag: 10,
            adjoint_factor: 2.0,
            ..Jacobian::default()
        };
        first.derive_sweep_costs();
        let mut second = Jacobian {
            i: 1,
            j: 2,
            n: 3,
            m: 4,
            edges_in_dag: 20,
            ..Jacobian::default()
        };
        second.derive_sweep_costs();

        let mut chain = JacobianChain::new(vec![first, second], 7);
        chain.optimized_costs = vec![0, 120, 90];
        chain
    }

    #[test]
    fn file_name_carries_length_and_id() {
        let dir = std::env::temp_dir();
        let path = write_graphml(&dir, &chain()).unwrap();

        assert_eq!(path.file_name().unwrap(), "chain_2_7.xml");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn document_contains_costs_nodes_and_edges() {
        let dir = std::env::temp_dir();
        let mut chain = chain();
        // A distinct id keeps this test's file apart from its sibling's.
        chain.id = 8;
        let path = write_graphml(&dir, &chain).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(path);

        assert!(contents.contains("<data key=\"optimized_cost_1\">120</data>"));
        assert!(contents.contains("<data key=\"optimized_cost_2\">90</data>"));
        // Three endpoints: 0, 1, 2.
        assert_eq!(contents.matches("<node id=").count(), 3);
        assert_eq!(contents.matches("<edge id=").count(), 2);
        // Edge costs come from the sweep model.
        assert!(contents.contains("<data key=\"adjoint_cost\">20</data>"));
        assert!(contents.contains("<data key=\"adjoint_memory\">10</data>"));
    }
}
