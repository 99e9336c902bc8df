//! Error types for the kiln IR.

/// Structural problems found by [`validate`](crate::validate).
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for its arena.
    #[error("{what} handle index {index} out of bounds (arena size: {size})")]
    BadHandle {
        what: &'static str,
        index: usize,
        size: usize,
    },

    /// A jump is followed by more instructions in its block.
    #[error("function '{function}': jump in block {block} is not the last instruction")]
    JumpNotLast { function: String, block: usize },

    /// A break or continue appears outside of any loop.
    #[error("function '{function}': block {block} jumps out of a loop it is not in")]
    JumpOutsideLoop { function: String, block: usize },

    /// A phi follows a non-phi instruction.
    #[error("function '{function}': phi in block {block} does not lead the block")]
    PhiNotLeading { function: String, block: usize },

    /// A phi does not have exactly one source per predecessor.
    #[error(
        "function '{function}': phi in block {block} has {sources} sources for {predecessors} predecessors"
    )]
    PhiSourceMismatch {
        function: String,
        block: usize,
        sources: usize,
        predecessors: usize,
    },

    /// An entry point names a function that does not exist.
    #[error("entry point '{0}' references a missing function")]
    MissingEntryFunction(String),
}
