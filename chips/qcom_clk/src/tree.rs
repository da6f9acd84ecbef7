// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! The clock tree.
//!
//! Nodes live in a caller-provided slice and refer to their parents by
//! index. Every parent must come before its children, which makes the graph
//! acyclic by construction and bounds all recursion by the tree depth.
//!
//! The tree does not reference count. `enable` brings up the chain of
//! currently selected parents before the node itself, `disable` only touches
//! the node, since its parents may still feed other consumers.

use crate::errorcode::ClockError;
use crate::hil::{ClockOps, ExternalClock, ParentRates, RateRequest};

/// Index of a node in a [`ClockTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

pub enum ClockNode<'a> {
    /// A clock managed outside the controller.
    External(&'a dyn ExternalClock),
    /// A generator or gate. `parents[i]` is the node behind parent index
    /// `i` of the node's source map.
    Programmable {
        ops: &'a dyn ClockOps,
        parents: &'a [NodeId],
    },
}

pub struct ClockTree<'a> {
    nodes: &'a [ClockNode<'a>],
}

/// Parents of one node, as seen by that node's `determine_rate`.
struct NodeParents<'t, 'a> {
    tree: &'t ClockTree<'a>,
    parents: &'a [NodeId],
}

impl ParentRates for NodeParents<'_, '_> {
    fn num_parents(&self) -> usize {
        self.parents.len()
    }

    fn rate(&self, index: usize) -> Result<u64, ClockError> {
        self.tree.rate(parent_at(self.parents, index)?)
    }

    fn round_rate(&self, index: usize, rate: u64) -> Result<u64, ClockError> {
        self.tree.round_rate(parent_at(self.parents, index)?, rate)
    }
}

fn parent_at(parents: &[NodeId], index: usize) -> Result<NodeId, ClockError> {
    parents.get(index).copied().ok_or(ClockError::InvalidParent)
}

impl<'a> ClockTree<'a> {
    /// Build a tree, rejecting any node whose parent does not precede it.
    pub fn new(nodes: &'a [ClockNode<'a>]) -> Result<Self, ClockError> {
        for (index, node) in nodes.iter().enumerate() {
            if let ClockNode::Programmable { parents, .. } = node {
                if parents.iter().any(|parent| parent.0 >= index) {
                    return Err(ClockError::InvalidParent);
                }
            }
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Result<&ClockNode<'a>, ClockError> {
        self.nodes.get(id.0).ok_or(ClockError::InvalidParent)
    }

    fn current_parent(
        &self,
        ops: &dyn ClockOps,
        parents: &[NodeId],
    ) -> Result<Option<NodeId>, ClockError> {
        if parents.is_empty() {
            return Ok(None);
        }
        parent_at(parents, ops.get_parent()?).map(Some)
    }

    /// Currently selected parent of `id`, `None` for external clocks.
    pub fn get_parent(&self, id: NodeId) -> Result<Option<NodeId>, ClockError> {
        match self.node(id)? {
            ClockNode::External(_) => Ok(None),
            ClockNode::Programmable { ops, parents } => self.current_parent(*ops, parents),
        }
    }

    /// Switch `id` to `parent`, which must be one of its parents.
    pub fn set_parent(&self, id: NodeId, parent: NodeId) -> Result<(), ClockError> {
        match self.node(id)? {
            ClockNode::External(_) => Err(ClockError::NoSupport),
            ClockNode::Programmable { ops, parents } => {
                let index = parents
                    .iter()
                    .position(|&p| p == parent)
                    .ok_or(ClockError::InvalidParent)?;
                ops.set_parent(index)
            }
        }
    }

    /// Rate `id` is running at.
    pub fn rate(&self, id: NodeId) -> Result<u64, ClockError> {
        match self.node(id)? {
            ClockNode::External(clk) => Ok(clk.rate()),
            ClockNode::Programmable { ops, parents } => {
                let parent_rate = match self.current_parent(*ops, parents)? {
                    Some(parent) => self.rate(parent)?,
                    None => 0,
                };
                ops.recalc_rate(parent_rate)
            }
        }
    }

    /// Negotiate `rate` for `id` without changing anything.
    pub fn determine_rate(&self, id: NodeId, rate: u64) -> Result<RateRequest, ClockError> {
        let mut req = RateRequest::new(rate);
        match self.node(id)? {
            ClockNode::External(clk) => {
                req.rate = clk.round_rate(rate);
            }
            ClockNode::Programmable { ops, parents } => {
                let view = NodeParents {
                    tree: self,
                    parents,
                };
                ops.determine_rate(&mut req, &view)?;
            }
        }
        Ok(req)
    }

    /// Rate `id` would run at if asked for `rate`.
    pub fn round_rate(&self, id: NodeId, rate: u64) -> Result<u64, ClockError> {
        self.determine_rate(id, rate).map(|req| req.rate)
    }

    /// Change the rate of `id`, first changing its parent's rate when the
    /// node propagates rate requests. Returns the new rate.
    pub fn set_rate(&self, id: NodeId, rate: u64) -> Result<u64, ClockError> {
        let req = self.determine_rate(id, rate)?;
        match self.node(id)? {
            ClockNode::External(clk) => {
                clk.set_rate(req.rate)?;
                Ok(req.rate)
            }
            ClockNode::Programmable { ops, parents } => {
                let parent_rate = match req.best_parent {
                    Some(index) if ops.propagates_rate() => {
                        self.set_rate(parent_at(parents, index)?, req.best_parent_rate)?
                    }
                    _ => req.best_parent_rate,
                };
                ops.set_rate(rate, parent_rate)?;
                debug!("{}: {} Hz from {} Hz", ops.name(), req.rate, parent_rate);
                Ok(req.rate)
            }
        }
    }

    /// Enable `id` after the chain of its selected parents.
    pub fn enable(&self, id: NodeId) -> Result<(), ClockError> {
        match self.node(id)? {
            ClockNode::External(clk) => clk.enable(),
            ClockNode::Programmable { ops, parents } => {
                if let Some(parent) = self.current_parent(*ops, parents)? {
                    self.enable(parent)?;
                }
                ops.enable()
            }
        }
    }

    /// Disable `id` only.
    pub fn disable(&self, id: NodeId) -> Result<(), ClockError> {
        match self.node(id)? {
            ClockNode::External(clk) => clk.disable(),
            ClockNode::Programmable { ops, .. } => ops.disable(),
        }
    }

    pub fn is_enabled(&self, id: NodeId) -> Result<bool, ClockError> {
        match self.node(id)? {
            ClockNode::External(clk) => Ok(clk.is_enabled()),
            ClockNode::Programmable { ops, .. } => ops.is_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{Branch, BranchConfig};
    use crate::freq_tbl::{FreqEntry, SourceId, SourceMapEntry};
    use crate::hil::FixedClock;
    use crate::rcg::{Rcg, RcgConfig, RcgFlags};
    use crate::regmap::Regmap;
    use crate::test_util::{branch_hardware, rcg_hardware, CountingDelay, FakePort, RCG_LATCHED_CFG};
    use core::cell::Cell;
    use std::boxed::Box;

    const XO: SourceId = SourceId(0);
    const GPLL0: SourceId = SourceId(1);
    const PARENT_MAP: [SourceMapEntry; 2] =
        [SourceMapEntry::new(XO, 0), SourceMapEntry::new(GPLL0, 1)];
    const TABLE: [FreqEntry; 3] = [
        FreqEntry::with_half_divider(19_200_000, XO, 2, 0, 0),
        FreqEntry::with_half_divider(100_000_000, GPLL0, 12, 0, 0),
        FreqEntry::with_half_divider(200_000_000, GPLL0, 6, 0, 0),
    ];

    const CMD: u32 = 0x1000;
    const CBCR: u32 = 0x1030;

    const RCG_PARENTS: [NodeId; 2] = [NodeId::new(0), NodeId::new(1)];
    const BRANCH_PARENTS: [NodeId; 1] = [NodeId::new(2)];

    fn port() -> FakePort {
        let rcg_hook = rcg_hardware(CMD);
        let branch_hook = branch_hardware(CBCR, 1, CBCR);
        let port = FakePort::with_hook(Box::new(move |regs, offset, value| {
            rcg_hook(regs, offset, value);
            branch_hook(regs, offset, value);
        }));
        port.preset(CBCR, 1 << 31);
        port
    }

    #[test]
    fn rejects_forward_references() {
        let xo = FixedClock::new(19_200_000);
        let port = FakePort::new();
        let delay = CountingDelay::new();
        let branch = Branch::new(Regmap::new(&port, &delay), BranchConfig::cbcr("b", CBCR));
        const SELF_PARENT: [NodeId; 1] = [NodeId::new(1)];

        let nodes = [
            ClockNode::External(&xo),
            ClockNode::Programmable {
                ops: &branch,
                parents: &SELF_PARENT,
            },
        ];
        assert!(matches!(ClockTree::new(&nodes), Err(ClockError::InvalidParent)));
    }

    #[test]
    fn rates_flow_down_the_tree() {
        let xo = FixedClock::new(19_200_000);
        let gpll0 = FixedClock::new(600_000_000);
        let port = port();
        let delay = CountingDelay::new();
        let regmap = Regmap::new(&port, &delay);
        let rcg = Rcg::new(regmap, RcgConfig::new("rcg", CMD, 5, 0, &PARENT_MAP, &TABLE)).unwrap();
        let branch = Branch::new(regmap, BranchConfig::cbcr("branch", CBCR).with_propagate_rate());

        let nodes = [
            ClockNode::External(&xo),
            ClockNode::External(&gpll0),
            ClockNode::Programmable {
                ops: &rcg,
                parents: &RCG_PARENTS,
            },
            ClockNode::Programmable {
                ops: &branch,
                parents: &BRANCH_PARENTS,
            },
        ];
        let tree = ClockTree::new(&nodes).unwrap();
        let rcg_id = NodeId::new(2);
        let branch_id = NodeId::new(3);

        assert_eq!(Ok(Some(NodeId::new(0))), tree.get_parent(rcg_id));
        assert_eq!(Ok(19_200_000), tree.rate(branch_id));
        assert_eq!(Ok(100_000_000), tree.round_rate(branch_id, 90_000_000));

        // The branch forwards the request to the generator.
        assert_eq!(Ok(100_000_000), tree.set_rate(branch_id, 90_000_000));
        assert_eq!((1 << 8) | 11, port.get(RCG_LATCHED_CFG));
        assert_eq!(Ok(Some(NodeId::new(1))), tree.get_parent(rcg_id));
        assert_eq!(Ok(100_000_000), tree.rate(branch_id));

        // The divider stays, only the source changes.
        tree.set_parent(rcg_id, NodeId::new(0)).unwrap();
        assert_eq!(Ok(3_200_000), tree.rate(rcg_id));
        assert_eq!(
            Err(ClockError::InvalidParent),
            tree.set_parent(rcg_id, NodeId::new(3))
        );
        assert_eq!(Err(ClockError::NoSupport), tree.set_parent(NodeId::new(0), NodeId::new(1)));
    }

    #[test]
    fn enable_brings_up_parents_first() {
        struct Pll {
            on: Cell<bool>,
        }
        impl ExternalClock for Pll {
            fn rate(&self) -> u64 {
                600_000_000
            }
            fn enable(&self) -> Result<(), ClockError> {
                self.on.set(true);
                Ok(())
            }
            fn disable(&self) -> Result<(), ClockError> {
                self.on.set(false);
                Ok(())
            }
            fn is_enabled(&self) -> bool {
                self.on.get()
            }
        }

        let xo = FixedClock::new(19_200_000);
        let gpll0 = Pll { on: Cell::new(false) };
        let port = port();
        port.preset(CMD + 4, 1 << 8);
        let delay = CountingDelay::new();
        let regmap = Regmap::new(&port, &delay);
        let flags = RcgFlags {
            needs_safe_switch: true,
            ..RcgFlags::NONE
        };
        let config = RcgConfig::new("rcg", CMD, 5, 0, &PARENT_MAP, &TABLE).with_flags(flags);
        let rcg = Rcg::new(regmap, config).unwrap();
        let branch = Branch::new(regmap, BranchConfig::cbcr("branch", CBCR));

        let nodes = [
            ClockNode::External(&xo),
            ClockNode::External(&gpll0),
            ClockNode::Programmable {
                ops: &rcg,
                parents: &RCG_PARENTS,
            },
            ClockNode::Programmable {
                ops: &branch,
                parents: &BRANCH_PARENTS,
            },
        ];
        let tree = ClockTree::new(&nodes).unwrap();

        assert_eq!(Ok(false), tree.is_enabled(NodeId::new(3)));
        tree.enable(NodeId::new(3)).unwrap();
        assert!(gpll0.is_enabled());
        assert_eq!(Ok(true), tree.is_enabled(NodeId::new(3)));
        assert_eq!(crate::rcg::SwitchState::Active, rcg.switch_state());

        tree.disable(NodeId::new(3)).unwrap();
        assert_eq!(Ok(false), tree.is_enabled(NodeId::new(3)));
        assert!(gpll0.is_enabled());
        assert_eq!(Ok(true), tree.is_enabled(NodeId::new(1)));
    }
}
