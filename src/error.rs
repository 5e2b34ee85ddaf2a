use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every outcome an analysis run can end with besides
/// success.
///
/// The variants are deliberately non-overlapping so callers can decide on policy without
/// inspecting messages:
///
/// - [`Error::Malformed`] - the input graph (or a frame / variable referenced by it) is invalid.
///   Fatal, no partial result is produced.
/// - [`Error::TooComplex`] - the worklist solver exhausted its step budget before reaching a
///   fixpoint. Callers must treat this as "no information", never as "empty information".
/// - [`Error::Cancelled`] - the caller asked the run to stop through the polled cancellation hook.
///
/// # Examples
///
/// ```rust
/// use flowscope::{analysis::CodeAssembler, Error};
///
/// let mut asm = CodeAssembler::new();
/// asm.push_const()?.pop()?; // falls off the end
///
/// match asm.finish() {
///     Err(Error::Malformed { message, .. }) => println!("rejected: {message}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// # Ok::<(), flowscope::Error>(())
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The instruction graph is malformed and cannot be analysed.
    ///
    /// Raised when execution could fall off the end of the instruction sequence, when a jump,
    /// switch or handler target does not resolve to a valid index, when an instruction refers to
    /// a variable the unit's store does not know, or when a supplied frame does not match the
    /// stack effect of its instruction. The error carries the source location where the problem
    /// was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The worklist step budget was exhausted before a fixpoint was reached.
    ///
    /// All partial facts of the affected pass have been discarded.
    #[error("Analysis too complex - gave up after {steps} steps (budget {budget})")]
    TooComplex {
        /// Number of charged steps performed before giving up
        steps: usize,
        /// The step budget that was in effect
        budget: usize,
    },

    /// The caller-supplied cancellation check requested an abort.
    #[error("Analysis was cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error means "gave up", as opposed to "was told to stop" or
    /// "the input is broken".
    #[must_use]
    pub fn is_too_complex(&self) -> bool {
        matches!(self, Error::TooComplex { .. })
    }
}
