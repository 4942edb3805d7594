//! Indented text dump of a decision tree.

use std::fmt;

use crate::dataset::{Schema, VariableKind};
use crate::node::{Node, NodeIndex};
use crate::tree::DecisionTree;

/// Borrowing [`fmt::Display`] adaptor returned by [`DecisionTree::display`].
pub struct TreeDisplay<'a> {
    tree: &'a DecisionTree,
    schema: &'a Schema,
}

impl DecisionTree {
    /// Render the tree as indented text, one line per branch.
    ///
    /// Branches read `name == level` for categorical splits and
    /// `name <= cut` / `name >  cut` for numeric ones; a branch ending in a
    /// leaf is followed by `[label] (distribution) *`.
    #[must_use]
    pub fn render(&self, schema: &Schema) -> String {
        self.display(schema).to_string()
    }

    /// Return a [`fmt::Display`] adaptor over the rendered tree.
    #[must_use]
    pub fn display<'a>(&'a self, schema: &'a Schema) -> TreeDisplay<'a> {
        TreeDisplay { tree: self, schema }
    }
}

impl TreeDisplay<'_> {
    fn write_leaf(&self, f: &mut fmt::Formatter<'_>, node: &Node) -> fmt::Result {
        let Node::Leaf { label, .. } = node else {
            return Ok(());
        };
        let name = self
            .schema
            .label_names()
            .get(*label)
            .map_or("?", String::as_str);
        let dist = node
            .distribution()
            .unwrap_or_default()
            .iter()
            .map(|p| format!("{p:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "   [{name}] ({dist}) *")
    }

    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        idx: NodeIndex,
        depth: usize,
        next_id: &mut usize,
    ) -> fmt::Result {
        let Node::Internal {
            variable,
            split_value,
            children,
            ..
        } = &self.tree.nodes[idx.index()]
        else {
            return Ok(());
        };
        *next_id += 1;
        let id = *next_id;
        let indent = " ..".repeat(depth);
        let var = self.schema.variable(*variable);

        for (i, &child) in children.iter().enumerate() {
            match (var.kind(), split_value) {
                (VariableKind::Discrete { levels }, _) => {
                    let level = levels.get(i).map_or("?", String::as_str);
                    write!(f, "{indent} {id}) {} == {level}", var.name())?;
                }
                (VariableKind::Continuous, Some(cut)) => {
                    let op = if i == 0 { "<=" } else { "> " };
                    write!(f, "{indent} {id}) {} {op} {cut}", var.name())?;
                }
                (VariableKind::Continuous, None) => {
                    write!(f, "{indent} {id}) {} ?", var.name())?;
                }
            }
            let child_node = &self.tree.nodes[child.index()];
            if child_node.is_leaf() {
                self.write_leaf(f, child_node)?;
            }
            writeln!(f)?;
            self.write_node(f, child, depth + 1, next_id)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.tree.root();
        if root.is_leaf() {
            self.write_leaf(f, root)?;
            return writeln!(f);
        }
        let mut next_id = 0;
        self.write_node(f, NodeIndex::new(0), 0, &mut next_id)
    }
}
