use std::cmp::Ordering;
use std::fmt::Debug;

/// An abstract domain which forms a lattice
pub trait AbstractDomain: Clone + Eq + Debug {
    /// Join with another abstract value
    fn join(&self, other: &Self) -> Self;

    /// Widening against the previous abstract value
    fn widen(&self, previous: &Self) -> Self;

    /// Narrowing against another abstract value
    fn narrow(&self, other: &Self) -> Self;

    /// Partial ordering comparison between two abstract values
    fn partial_order(&self, other: &Self) -> Ordering;

    /// Get the Bottom value of this lattice
    fn bottom() -> Self;
}

/// Holds iff the left value carries no information the right one lacks.
pub fn covered_by<D: AbstractDomain>(left: &D, right: &D) -> bool {
    left.partial_order(right) != Ordering::Greater
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Check the lattice axioms over a sample of abstract values.
    pub(crate) fn check_lattice_axioms<D: AbstractDomain>(samples: &[D]) {
        let bottom = D::bottom();
        for a in samples {
            // reflexivity
            assert_eq!(a.partial_order(a), Ordering::Equal);
            // idempotence
            assert_eq!(&a.join(a), a);
            // bottom is the identity of join
            assert_eq!(&a.join(&bottom), a);
            assert_eq!(&bottom.join(a), a);
            assert!(covered_by(&bottom, a));
            for b in samples {
                // commutativity
                assert_eq!(a.join(b), b.join(a));
                // join is an upper bound of both sides
                let joined = a.join(b);
                assert!(covered_by(a, &joined));
                assert!(covered_by(b, &joined));
                for c in samples {
                    // associativity
                    assert_eq!(a.join(b).join(c), a.join(&b.join(c)));
                }
            }
        }
    }
}
