//! Mux encoding: one design carrying every papercut behind select inputs.

use tracing::info;

use super::rewrite::{ConflictPolicy, Conflict, RewriteSet};
use crate::design::{add_select_inputs, module_name, rename_module, select_port};
use crate::error::Result;
use crate::syntax::SyntaxTree;

/// Suffix of the mux-encoded module.
pub const MUXED_SUFFIX: &str = "_muxed";

/// A mux-encoded design with its select inputs
#[derive(Debug, Clone)]
pub struct MuxedDesign {
    pub tree: SyntaxTree,
    pub module: String,
    pub select_count: usize,
    /// Per select, the value that reproduces the original behavior
    pub neutral: Vec<bool>,
    pub conflicts: Vec<Conflict>,
}

impl MuxedDesign {
    /// `(port, value)` ties that turn every papercut off.
    pub fn neutral_ties(&self) -> Vec<(String, bool)> {
        self.neutral
            .iter()
            .enumerate()
            .map(|(index, value)| (select_port(index), *value))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MuxEncoder {
    policy: ConflictPolicy,
}

impl MuxEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply every mux, rename the top module and add the select inputs.
    pub fn encode(&self, tree: &SyntaxTree, rewrites: &RewriteSet) -> Result<MuxedDesign> {
        let applied = rewrites.apply_muxes(tree, self.policy)?;
        let module = format!("{}{}", module_name(tree)?, MUXED_SUFFIX);
        let renamed = rename_module(&applied.tree, &module)?;
        let select_count = rewrites.total_selections();
        let tree = add_select_inputs(&renamed, select_count)?;
        info!(
            module = %module,
            selects = select_count,
            conflicts = applied.conflicts.len(),
            "Mux-encoded design"
        );
        Ok(MuxedDesign {
            tree,
            module,
            select_count,
            neutral: rewrites.neutral_selects(),
            conflicts: applied.conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{Direction, ports};
    use crate::mutation::site::{Category, SiteLocator};

    #[test]
    fn test_if_and_ternary_add_four_select_ports() {
        let source = "\
module m(input logic clk, c, input logic [3:0] a, b, output logic [3:0] y, z);
  assign y = c ? a : b;
  always_ff @(posedge clk) begin
    if (c) z <= a;
    else z <= b;
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let sites = SiteLocator::new(&tree).locate_all(&[Category::Conditional, Category::Ternary]);
        let set = RewriteSet::from_sites(&tree, &sites).unwrap();
        let muxed = MuxEncoder::new().encode(&tree, &set).unwrap();
        assert_eq!(muxed.module, "m_muxed");
        assert_eq!(muxed.select_count, 4);

        let before = ports(&tree).unwrap();
        let after = ports(&muxed.tree).unwrap();
        assert_eq!(after.len(), before.len() + 4);
        let added: Vec<_> = after.iter().filter(|p| !before.contains(p)).collect();
        assert_eq!(added.len(), 4);
        assert!(added
            .iter()
            .all(|p| p.direction == Direction::Input && p.name.starts_with("pc_sel")));
        assert!(before.iter().all(|p| after.contains(p)));
        assert!(muxed.tree.source().contains("if ((pc_sel1 || (!pc_sel0 && (c)))) z <= a;"));
        assert!(muxed.tree.source().contains("assign y = (pc_sel3 || (!pc_sel2 && (c))) ? a : b;"));
    }

    #[test]
    fn test_neutral_ties() {
        let source = "\
module m(input logic c, input logic [3:0] a, output logic [3:0] y);
  logic [3:0] r;
  assign r = a;
  assign y = c ? r : a;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let sites = SiteLocator::new(&tree).locate_all(&[Category::BitShrink, Category::Ternary]);
        let set = RewriteSet::from_sites(&tree, &sites).unwrap();
        let muxed = MuxEncoder::new().encode(&tree, &set).unwrap();
        assert_eq!(
            muxed.neutral_ties(),
            vec![
                ("pc_sel0".to_string(), true),
                ("pc_sel1".to_string(), false),
                ("pc_sel2".to_string(), false),
            ]
        );
    }
}
