//! The scheduling tree: control blocks grouping statements by clock state.
use crate::control::StmtIdx;
use gearc_idx::{IndexedMap, impl_index};
use smallvec::SmallVec;

/// Index of a [CBlock] in [Schedule::nodes].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CBlockIdx(u32);
impl_index!(CBlockIdx);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CBlockKind {
    /// Children execute in successive states.
    Seq,
    /// Children are mutually exclusive alternatives.
    Mutex,
    /// Statements executed in a single state.
    Leaf,
}

/// State ids of a scheduling unit. Most units live in very few states.
pub type StateIds = SmallVec<[u32; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub struct CBlock {
    pub kind: CBlockKind,
    /// The control block this unit was built from. `None` for leaves.
    pub hdl_block: Option<StmtIdx>,
    pub parent: Option<CBlockIdx>,
    pub child: Vec<CBlockIdx>,
    /// Statements of a leaf, ending with at most one blocking statement.
    pub stmts: Vec<StmtIdx>,
    /// States this unit is live in, filled by the state finder.
    pub state_ids: StateIds,
    /// Free statements executed when entering this unit.
    pub prolog: Vec<StmtIdx>,
    /// Free statements executed when leaving this unit.
    pub epilog: Vec<StmtIdx>,
}

impl CBlock {
    pub fn new(
        kind: CBlockKind,
        hdl_block: Option<StmtIdx>,
        parent: Option<CBlockIdx>,
    ) -> Self {
        Self {
            kind,
            hdl_block,
            parent,
            child: vec![],
            stmts: vec![],
            state_ids: StateIds::new(),
            prolog: vec![],
            epilog: vec![],
        }
    }

    pub fn leaf(parent: Option<CBlockIdx>, stmts: Vec<StmtIdx>) -> Self {
        Self {
            stmts,
            ..Self::new(CBlockKind::Leaf, None, parent)
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == CBlockKind::Leaf
    }

    /// The state this unit is entered in.
    pub fn first_state(&self) -> Option<u32> {
        self.state_ids.first().copied()
    }
}

/// An arena of control blocks rooted at the module's unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub nodes: IndexedMap<CBlockIdx, CBlock>,
    pub root: CBlockIdx,
}

impl Schedule {
    pub fn get(&self, idx: CBlockIdx) -> &CBlock {
        &self.nodes[idx]
    }

    pub fn get_mut(&mut self, idx: CBlockIdx) -> &mut CBlock {
        &mut self.nodes[idx]
    }

    /// All units in pre-order.
    pub fn preorder(&self) -> Vec<CBlockIdx> {
        let mut acc = vec![];
        let mut stack = vec![self.root];
        while let Some(cur) = stack.pop() {
            acc.push(cur);
            stack.extend(self.get(cur).child.iter().rev());
        }
        acc
    }
}
