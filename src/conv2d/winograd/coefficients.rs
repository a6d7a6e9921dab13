//! Transform matrices of the minimal filtering algorithms F(m, r)

/// The 1-D matrices of F(`M`, `R`) with `A = M + R - 1` points.
///
/// `AT` is the output transform, `G` the filter transform and `BT` the input
/// transform, so that `y = AT * ((G * g) . (BT * d))` is the correlation of
/// `d` (length `A`) with `g` (length `R`).
pub trait Coefficients<const M: usize, const R: usize, const A: usize> {
    /// Output transform, `M x A`
    const AT: [[f64; A]; M];
    /// Filter transform, `A x R`
    const G: [[f64; R]; A];
    /// Input transform, `A x A`
    const BT: [[f64; A]; A];
}

/// Carrier of every implemented F(m, r)
#[derive(Debug, Clone, Copy, Default)]
pub struct Minimal;

impl Coefficients<1, 1, 1> for Minimal {
    const AT: [[f64; 1]; 1] = [[1.0]];
    const G: [[f64; 1]; 1] = [[1.0]];
    const BT: [[f64; 1]; 1] = [[1.0]];
}

const BT_4: [[f64; 4]; 4] = [
    [1.0, 0.0, -1.0, 0.0],
    [0.0, 1.0, 1.0, 0.0],
    [0.0, -1.0, 1.0, 0.0],
    [0.0, -1.0, 0.0, 1.0],
];

impl Coefficients<2, 3, 4> for Minimal {
    const AT: [[f64; 4]; 2] = [[1.0, 1.0, 1.0, 0.0], [0.0, 1.0, -1.0, 1.0]];
    const G: [[f64; 3]; 4] = [
        [1.0, 0.0, 0.0],
        [0.5, 0.5, 0.5],
        [0.5, -0.5, 0.5],
        [0.0, 0.0, 1.0],
    ];
    const BT: [[f64; 4]; 4] = BT_4;
}

impl Coefficients<3, 2, 4> for Minimal {
    const AT: [[f64; 4]; 3] = [
        [1.0, 1.0, 1.0, 0.0],
        [0.0, 1.0, -1.0, 0.0],
        [0.0, 1.0, 1.0, 1.0],
    ];
    const G: [[f64; 2]; 4] = [[1.0, 0.0], [0.5, 0.5], [0.5, -0.5], [0.0, 1.0]];
    const BT: [[f64; 4]; 4] = BT_4;
}

impl Coefficients<4, 3, 6> for Minimal {
    const AT: [[f64; 6]; 4] = [
        [1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
        [0.0, 1.0, -1.0, 2.0, -2.0, 0.0],
        [0.0, 1.0, 1.0, 4.0, 4.0, 0.0],
        [0.0, 1.0, -1.0, 8.0, -8.0, 1.0],
    ];
    const G: [[f64; 3]; 6] = [
        [1.0 / 4.0, 0.0, 0.0],
        [-1.0 / 6.0, -1.0 / 6.0, -1.0 / 6.0],
        [-1.0 / 6.0, 1.0 / 6.0, -1.0 / 6.0],
        [1.0 / 24.0, 1.0 / 12.0, 1.0 / 6.0],
        [1.0 / 24.0, -1.0 / 12.0, 1.0 / 6.0],
        [0.0, 0.0, 1.0],
    ];
    const BT: [[f64; 6]; 6] = [
        [4.0, 0.0, -5.0, 0.0, 1.0, 0.0],
        [0.0, -4.0, -4.0, 1.0, 1.0, 0.0],
        [0.0, 4.0, -4.0, -1.0, 1.0, 0.0],
        [0.0, -2.0, -1.0, 2.0, 1.0, 0.0],
        [0.0, 2.0, -1.0, -2.0, 1.0, 0.0],
        [0.0, 4.0, 0.0, -5.0, 0.0, 1.0],
    ];
}

impl Coefficients<3, 3, 5> for Minimal {
    const AT: [[f64; 5]; 3] = [
        [1.0, 1.0, 1.0, 1.0, 0.0],
        [0.0, 1.0, -1.0, 2.0, 0.0],
        [0.0, 1.0, 1.0, 4.0, 1.0],
    ];
    const G: [[f64; 3]; 5] = [
        [0.5, 0.0, 0.0],
        [0.5, 0.5, 0.5],
        [1.0 / 6.0, -1.0 / 6.0, 1.0 / 6.0],
        [1.0 / 6.0, 1.0 / 3.0, 2.0 / 3.0],
        [0.0, 0.0, 1.0],
    ];
    const BT: [[f64; 5]; 5] = [
        [2.0, -1.0, -2.0, 1.0, 0.0],
        [0.0, 2.0, 1.0, -1.0, 0.0],
        [0.0, -2.0, 3.0, -1.0, 0.0],
        [0.0, -1.0, 0.0, 1.0, 0.0],
        [0.0, 2.0, -1.0, -2.0, 1.0],
    ];
}
