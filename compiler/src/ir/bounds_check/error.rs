use crate::ir::{IrFunctionId, IrId};
use std::fmt;

/// Failure while instrumenting array accesses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsCheckError {
    /// No capacity could be traced for the memory region behind `base`
    UnresolvedSize {
        function: String,
        /// The access (or call argument) that needed the capacity
        site: Option<IrId>,
        base: IrId,
    },
    /// An access recorded during collection is no longer in the function body
    SiteNotFound { function: String, site: IrId },
    /// A function the run depends on is not in the module
    MissingFunction(IrFunctionId),
}

impl BoundsCheckError {
    /// Attach the access that needed the value, keeping an existing one
    pub fn at_site(self, at: IrId) -> Self {
        match self {
            BoundsCheckError::UnresolvedSize {
                function,
                site: None,
                base,
            } => BoundsCheckError::UnresolvedSize {
                function,
                site: Some(at),
                base,
            },
            other => other,
        }
    }

    /// Whether this error is an untraceable capacity
    pub fn is_unresolved_size(&self) -> bool {
        matches!(self, BoundsCheckError::UnresolvedSize { .. })
    }
}

impl fmt::Display for BoundsCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsCheckError::UnresolvedSize {
                function,
                site: Some(site),
                base,
            } => write!(
                f,
                "cannot determine the capacity of {} for access {} in {}",
                base, site, function
            ),
            BoundsCheckError::UnresolvedSize {
                function,
                site: None,
                base,
            } => write!(f, "cannot determine the capacity of {} in {}", base, function),
            BoundsCheckError::SiteNotFound { function, site } => {
                write!(f, "access {} not found in {}", site, function)
            }
            BoundsCheckError::MissingFunction(id) => write!(f, "function {} not found in module", id),
        }
    }
}

impl std::error::Error for BoundsCheckError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_site_fills_only_missing_site() {
        let err = BoundsCheckError::UnresolvedSize {
            function: "f".to_string(),
            site: None,
            base: IrId::new(3),
        };
        let err = err.at_site(IrId::new(7)).at_site(IrId::new(9));
        assert_eq!(
            err,
            BoundsCheckError::UnresolvedSize {
                function: "f".to_string(),
                site: Some(IrId::new(7)),
                base: IrId::new(3),
            }
        );
        assert!(err.is_unresolved_size());
        assert_eq!(
            err.to_string(),
            "cannot determine the capacity of $3 for access $7 in f"
        );
    }

    #[test]
    fn test_structural_errors_display() {
        let err = BoundsCheckError::SiteNotFound {
            function: "g".to_string(),
            site: IrId::new(1),
        };
        assert_eq!(err.to_string(), "access $1 not found in g");
        assert!(!err.is_unresolved_size());
        assert_eq!(
            BoundsCheckError::MissingFunction(IrFunctionId(4)).to_string(),
            "function fn4 not found in module"
        );
    }
}
