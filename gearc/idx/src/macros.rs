/// Implements [`IndexRef`](crate::IndexRef) and `Display` for a newtype over
/// `u32`.
#[macro_export]
macro_rules! impl_index {
    ($name: ident) => {
        impl $crate::IndexRef for $name {
            fn index(&self) -> usize {
                self.0 as usize
            }

            fn new(input: usize) -> Self {
                Self(input as u32)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
