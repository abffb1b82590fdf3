//! Reversible mutations over a single code unit.

/// Capability to alter a representation `R` and to undo that alteration.
///
/// Implementations decide what a mutation *is*; the harness only calls
/// [`mutate`](MutationStrategy::mutate) and [`reset`](MutationStrategy::reset).
pub trait MutationStrategy<R> {
    /// Mutate the live representation in place.
    fn mutate(&self, live: &mut R);

    /// Restore the live representation given the pristine snapshot.
    fn reset(&self, live: &mut R, pristine: &R);
}

/// Strategy that mutates through a closure and resets by cloning the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FnStrategy<F> {
    mutate: F,
}

impl<F> FnStrategy<F> {
    /// Wrap a mutation closure.
    pub fn new(mutate: F) -> Self {
        Self { mutate }
    }
}

impl<R, F> MutationStrategy<R> for FnStrategy<F>
where
    R: Clone,
    F: Fn(&mut R),
{
    fn mutate(&self, live: &mut R) {
        (self.mutate)(live);
    }

    fn reset(&self, live: &mut R, pristine: &R) {
        live.clone_from(pristine);
    }
}

/// Object-safe view of a mutable unit, for schedulers holding mixed unit types.
pub trait Mutation {
    /// Identifier of the mutated code unit.
    fn id(&self) -> &str;

    /// Apply the mutation. Applying twice without a reset is a no-op.
    fn mutate(&mut self);

    /// Roll back to the pristine snapshot. No-op when nothing is applied.
    fn reset(&mut self);

    /// Whether the mutation is currently applied.
    fn is_applied(&self) -> bool;
}

/// One code unit with its live representation and pristine snapshot.
#[derive(Debug, Clone)]
pub struct MutableUnit<R, S> {
    id: String,
    live: R,
    pristine: R,
    strategy: S,
    applied: bool,
}

impl<R, S> MutableUnit<R, S>
where
    R: Clone,
    S: MutationStrategy<R>,
{
    /// Capture `representation` as the pristine snapshot and wrap it.
    pub fn new(id: impl Into<String>, representation: R, strategy: S) -> Self {
        let pristine = representation.clone();
        Self {
            id: id.into(),
            live: representation,
            pristine,
            strategy,
            applied: false,
        }
    }

    /// Apply the strategy to the live representation.
    ///
    /// Returns `false` without touching the representation when the mutation
    /// is already applied.
    pub fn apply(&mut self) -> bool {
        if self.applied {
            return false;
        }
        self.strategy.mutate(&mut self.live);
        self.applied = true;
        true
    }

    /// Restore the live representation to the pristine snapshot.
    ///
    /// Returns `false` when there was nothing to undo.
    pub fn reset(&mut self) -> bool {
        if !self.applied {
            return false;
        }
        self.strategy.reset(&mut self.live, &self.pristine);
        self.applied = false;
        true
    }

    /// Unit identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current (possibly mutated) representation.
    pub fn live(&self) -> &R {
        &self.live
    }

    /// Snapshot captured at construction.
    pub fn pristine(&self) -> &R {
        &self.pristine
    }

    /// Whether the mutation is currently applied.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Consume the unit, returning the live representation.
    pub fn into_live(self) -> R {
        self.live
    }
}

impl<R, S> MutableUnit<R, S>
where
    R: Clone + PartialEq,
    S: MutationStrategy<R>,
{
    /// True when the live representation equals the pristine snapshot.
    pub fn is_pristine(&self) -> bool {
        self.live == self.pristine
    }
}

impl<R, S> Mutation for MutableUnit<R, S>
where
    R: Clone,
    S: MutationStrategy<R>,
{
    fn id(&self) -> &str {
        MutableUnit::id(self)
    }

    fn mutate(&mut self) {
        self.apply();
    }

    fn reset(&mut self) {
        MutableUnit::reset(self);
    }

    fn is_applied(&self) -> bool {
        self.applied
    }
}
