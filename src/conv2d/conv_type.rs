//! Type-level tags for the three convolution directions

/// Runtime mirror of a [`ConvType`] tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `output = input (*) filter`
    Forward,
    /// Gradient of the loss with respect to the input
    InputGradient,
    /// Gradient of the loss with respect to the filter
    FilterGradient,
}

/// A convolution direction fixed at compile time.
///
/// Launchers and kernels are generic over the tag and branch on
/// [`ConvType::DIRECTION`], which the compiler resolves per instantiation.
pub trait ConvType: Copy + Default + Send + Sync + 'static {
    /// The direction this tag names
    const DIRECTION: Direction;
}

/// Forward convolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Forward;

/// Input gradient (backprop through the input)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InputGradient;

/// Filter gradient (backprop through the filter)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FilterGradient;

impl ConvType for Forward {
    const DIRECTION: Direction = Direction::Forward;
}

impl ConvType for InputGradient {
    const DIRECTION: Direction = Direction::InputGradient;
}

impl ConvType for FilterGradient {
    const DIRECTION: Direction = Direction::FilterGradient;
}
