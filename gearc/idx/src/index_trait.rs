/// A typed index into an [`IndexedMap`](crate::IndexedMap).
pub trait IndexRef: Copy + Eq {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}
