//! Predicate values over model state.
//!
//! A [`Condition`] is anything that can answer "does this hold for
//! `T`?". Closures implement it directly; the [`and`](Condition::and),
//! [`or`](Condition::or) and [`not`](Condition::not) combinators compose
//! existing conditions without naming new types.

/// A predicate over `T`.
pub trait Condition<T: ?Sized> {
    /// Evaluate the predicate.
    fn check(&self, subject: &T) -> bool;

    /// Both `self` and `other` hold.
    fn and<C: Condition<T>>(self, other: C) -> And<Self, C>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Either `self` or `other` holds.
    fn or<C: Condition<T>>(self, other: C) -> Or<Self, C>
    where
        Self: Sized,
    {
        Or(self, other)
    }

    /// `self` does not hold.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

impl<T: ?Sized, F> Condition<T> for F
where
    F: Fn(&T) -> bool,
{
    fn check(&self, subject: &T) -> bool {
        self(subject)
    }
}

/// Conjunction of two conditions. Short-circuits on the left operand.
#[derive(Clone, Copy, Debug)]
pub struct And<A, B>(A, B);

impl<T: ?Sized, A: Condition<T>, B: Condition<T>> Condition<T> for And<A, B> {
    fn check(&self, subject: &T) -> bool {
        self.0.check(subject) && self.1.check(subject)
    }
}

/// Disjunction of two conditions. Short-circuits on the left operand.
#[derive(Clone, Copy, Debug)]
pub struct Or<A, B>(A, B);

impl<T: ?Sized, A: Condition<T>, B: Condition<T>> Condition<T> for Or<A, B> {
    fn check(&self, subject: &T) -> bool {
        self.0.check(subject) || self.1.check(subject)
    }
}

/// Negation of a condition.
#[derive(Clone, Copy, Debug)]
pub struct Not<A>(A);

impl<T: ?Sized, A: Condition<T>> Condition<T> for Not<A> {
    fn check(&self, subject: &T) -> bool {
        !self.0.check(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(x: &i32) -> bool {
        *x > 0
    }

    fn even(x: &i32) -> bool {
        x % 2 == 0
    }

    #[test]
    fn closures_are_conditions() {
        let c = |x: &i32| *x == 3;
        assert!(c.check(&3));
        assert!(!c.check(&4));
    }

    #[test]
    fn combinators_compose() {
        let both = positive.and(even);
        assert!(both.check(&4));
        assert!(!both.check(&3));
        assert!(!both.check(&-2));

        let either = positive.or(even);
        assert!(either.check(&-2));
        assert!(!either.check(&-3));

        let neither = positive.or(even).not();
        assert!(neither.check(&-3));
    }

    #[test]
    fn unsized_subjects() {
        let non_empty = |s: &str| !s.is_empty();
        assert!(non_empty.check("x"));
        assert!(!non_empty.check(""));
    }
}
