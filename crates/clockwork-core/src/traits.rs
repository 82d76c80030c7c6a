//! Capability traits shared by processes, entities and wait lists.
//!
//! Model components opt into exactly the capabilities they need instead
//! of inheriting them from a common base.

use crate::id::EntityId;

/// Anything with a human-readable name.
pub trait Named {
    /// The component's name.
    fn name(&self) -> &str;

    /// The name wrapped in single quotes, as used in trace and warning
    /// messages.
    fn quoted_name(&self) -> String {
        format!("'{}'", self.name())
    }
}

/// A component that may emit trace notes.
pub trait Traced {
    /// Whether trace notes for this component are emitted.
    fn trace_enabled(&self) -> bool;
}

/// A component that belongs to a named model.
pub trait Owned {
    /// Name of the owning model.
    fn owner(&self) -> &str;
}

/// Anything carrying a scheduling or queueing priority.
///
/// Higher values are more urgent.
pub trait Prioritized {
    /// The current priority.
    fn priority(&self) -> i32;
}

/// Anything that stands for a simulated entity.
pub trait Identified {
    /// The entity's id.
    fn entity_id(&self) -> EntityId;
}

impl<T: Named + ?Sized> Named for &T {
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Prioritized + ?Sized> Prioritized for &T {
    fn priority(&self) -> i32 {
        (**self).priority()
    }
}

impl<T: Identified + ?Sized> Identified for &T {
    fn entity_id(&self) -> EntityId {
        (**self).entity_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Machine {
        name: String,
        model: String,
    }

    impl Named for Machine {
        fn name(&self) -> &str {
            &self.name
        }
    }

    impl Owned for Machine {
        fn owner(&self) -> &str {
            &self.model
        }
    }

    #[test]
    fn quoted_name_wraps_in_quotes() {
        let m = Machine {
            name: "lathe".into(),
            model: "shop".into(),
        };
        assert_eq!(m.quoted_name(), "'lathe'");
        assert_eq!(m.owner(), "shop");
    }

    #[test]
    fn references_forward_capabilities() {
        let m = Machine {
            name: "mill".into(),
            model: "shop".into(),
        };
        let r = &m;
        assert_eq!(Named::name(&r), "mill");
    }
}
