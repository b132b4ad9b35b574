//! Parent slots of a revision and their normalized view.

use smallvec::SmallVec;

use crate::error::{BridgeError, Result};
use crate::types::NodeId;

/// Up to two parent identities, NULL entries omitted.
pub type ParentList = SmallVec<[NodeId; 2]>;

/// Normalized view over a record's two parent slots.
///
/// The slots themselves are raw: a record may carry a NULL first parent and a
/// non-NULL second one. `parents()` hides NULL slots but keeps the position of
/// the remaining ones.
pub trait Parents {
    /// First parent slot, possibly NULL.
    fn parent1(&self) -> Result<NodeId>;
    /// Second parent slot, possibly NULL.
    fn parent2(&self) -> Result<NodeId>;
    /// Overwrites the first parent slot.
    fn set_parent1(&mut self, parent: &NodeId);
    /// Overwrites the second parent slot.
    fn set_parent2(&mut self, parent: &NodeId);

    /// Non-NULL parents in slot order.
    fn parents(&self) -> Result<ParentList> {
        let (p1, p2) = (self.parent1()?, self.parent2()?);
        Ok([p1, p2].into_iter().filter(|p| !p.is_null()).collect())
    }

    /// Replaces both slots. Missing entries become NULL.
    fn set_parents(&mut self, parents: &[NodeId]) -> Result<()> {
        match parents {
            [] => {
                self.set_parent1(&NodeId::NULL);
                self.set_parent2(&NodeId::NULL);
            }
            [p1] => {
                self.set_parent1(p1);
                self.set_parent2(&NodeId::NULL);
            }
            [p1, p2] => {
                self.set_parent1(p1);
                self.set_parent2(p2);
            }
            _ => {
                return Err(BridgeError::InvalidArgument(format!(
                    "a revision has at most 2 parents, got {}",
                    parents.len()
                )))
            }
        }
        Ok(())
    }
}
