//! Equivalence wrappers
//!
//! A wrapper instantiates the base design and a mutated design side by side
//! on shared inputs and drives a single `equiv` output that is true while
//! every output pair agrees. Under `FORMAL` it asserts `equiv`.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::design::{Direction, Port, module_name, ports};
use crate::error::Result;
use crate::syntax::SyntaxTree;

/// Suffix of wrapper modules and their artifacts.
pub const WRAPPER_SUFFIX: &str = "_wrapper";

pub fn wrapper_name(module: &str) -> String {
    format!("{}{}", module, WRAPPER_SUFFIX)
}

/// A rendered wrapper module
#[derive(Debug, Clone)]
pub struct Wrapper {
    pub name: String,
    pub source: String,
    /// Outputs compared by `equiv`
    pub compared: Vec<String>,
}

/// Render a wrapper comparing `mutated` against `base`.
///
/// Inputs that only the mutated design has are tied to the value in `ties`,
/// or low when absent.
pub fn render_wrapper(
    base: &SyntaxTree,
    mutated: &SyntaxTree,
    ties: &HashMap<String, bool>,
) -> Result<Wrapper> {
    let base_module = module_name(base)?;
    let mutated_module = module_name(mutated)?;
    let base_ports = ports(base)?;
    let mutated_ports = ports(mutated)?;
    let name = wrapper_name(&mutated_module);

    let shared: Vec<&Port> = base_ports
        .iter()
        .filter(|p| p.direction != Direction::Output)
        .collect();
    let outputs: Vec<&Port> = base_ports
        .iter()
        .filter(|p| p.direction == Direction::Output)
        .collect();
    let compared: Vec<&Port> = outputs
        .iter()
        .copied()
        .filter(|o| {
            mutated_ports
                .iter()
                .any(|p| p.name == o.name && p.direction == Direction::Output)
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "module {} (", name);
    for port in &shared {
        let _ = writeln!(out, "  {} {} {},", port.direction, port.ty, port.name);
    }
    out.push_str("  output logic equiv\n);\n");

    for port in &outputs {
        let _ = writeln!(out, "  {} {}_{};", port.ty, base_module, port.name);
    }
    for port in mutated_ports.iter().filter(|p| p.direction == Direction::Output) {
        let _ = writeln!(out, "  {} {}_{};", port.ty, mutated_module, port.name);
    }
    out.push('\n');

    let base_connections = base_ports
        .iter()
        .map(|p| connection(p, &base_module, None))
        .collect::<Vec<_>>();
    instance(&mut out, &base_module, "u_original", &base_connections);

    let mutated_connections = mutated_ports
        .iter()
        .map(|p| {
            let shared_port = shared.iter().any(|s| s.name == p.name);
            let tie = (!shared_port && p.direction != Direction::Output)
                .then(|| ties.get(&p.name).copied().unwrap_or(false));
            connection(p, &mutated_module, tie)
        })
        .collect::<Vec<_>>();
    instance(&mut out, &mutated_module, "u_mutated", &mutated_connections);

    if compared.is_empty() {
        out.push_str("\n  assign equiv = 1'b1;\n");
    } else {
        let checks: Vec<String> = compared
            .iter()
            .map(|p| format!("({}_{} == {}_{})", base_module, p.name, mutated_module, p.name))
            .collect();
        let _ = writeln!(out, "\n  assign equiv = {};", checks.join(" && "));
    }
    out.push_str("\n`ifdef FORMAL\n  always @(*) assert (equiv);\n`endif\n\nendmodule\n");

    Ok(Wrapper {
        name,
        source: out,
        compared: compared.iter().map(|p| p.name.clone()).collect(),
    })
}

fn connection(port: &Port, module: &str, tie: Option<bool>) -> String {
    match (port.direction, tie) {
        (Direction::Output, _) => format!(".{}({}_{})", port.name, module, port.name),
        (_, Some(high)) => format!(".{}(1'b{})", port.name, u8::from(high)),
        (_, None) => format!(".{}({})", port.name, port.name),
    }
}

fn instance(out: &mut String, module: &str, instance: &str, connections: &[String]) {
    if connections.is_empty() {
        let _ = writeln!(out, "  {} {} ();", module, instance);
        return;
    }
    let _ = writeln!(out, "  {} {} (", module, instance);
    let _ = writeln!(out, "    {}", connections.join(",\n    "));
    out.push_str("  );\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "\
module alu(input logic [3:0] a, b, input logic op, output logic [3:0] y, output logic z);
  assign y = op ? a + b : a - b;
  assign z = ~|y;
endmodule
";

    #[test]
    fn test_wrapper_compares_every_output() {
        let base = SyntaxTree::parse(BASE).unwrap();
        let mutated = SyntaxTree::parse(BASE.replace("module alu(", "module alu_ternary0(")).unwrap();
        let wrapper = render_wrapper(&base, &mutated, &HashMap::new()).unwrap();
        assert_eq!(wrapper.name, "alu_ternary0_wrapper");
        assert_eq!(wrapper.compared, vec!["y", "z"]);
        let text = &wrapper.source;
        assert!(text.starts_with("module alu_ternary0_wrapper (\n  input logic [3:0] a,\n"));
        assert!(text.contains("  output logic equiv\n);"));
        assert!(text.contains("  logic [3:0] alu_y;\n"));
        assert!(text.contains("  alu u_original (\n    .a(a),\n"));
        assert!(text.contains(".y(alu_ternary0_y)"));
        assert!(text.contains(
            "assign equiv = (alu_y == alu_ternary0_y) && (alu_z == alu_ternary0_z);"
        ));
        assert!(text.contains("`ifdef FORMAL\n  always @(*) assert (equiv);\n`endif"));
        SyntaxTree::parse(text.as_str()).unwrap();
    }

    #[test]
    fn test_extra_inputs_are_tied() {
        let base = SyntaxTree::parse(BASE).unwrap();
        let mutated = SyntaxTree::parse(BASE.replace(
            "module alu(",
            "module alu_muxed(input logic pc_sel0, pc_sel1, ",
        ))
        .unwrap();
        let ties = HashMap::from([("pc_sel1".to_string(), true)]);
        let wrapper = render_wrapper(&base, &mutated, &ties).unwrap();
        assert!(wrapper.source.contains(".pc_sel0(1'b0)"));
        assert!(wrapper.source.contains(".pc_sel1(1'b1)"));
        assert!(!wrapper.source.contains("input logic pc_sel0"));
    }

    #[test]
    fn test_no_outputs_is_trivially_equivalent() {
        let base = SyntaxTree::parse("module sink(input logic a);\nendmodule\n").unwrap();
        let mutated = SyntaxTree::parse("module sink_if0(input logic a);\nendmodule\n").unwrap();
        let wrapper = render_wrapper(&base, &mutated, &HashMap::new()).unwrap();
        assert!(wrapper.source.contains("assign equiv = 1'b1;"));
        assert!(wrapper.compared.is_empty());
    }
}
