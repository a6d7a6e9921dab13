//! Separable 2-D Winograd transforms on register tiles
//!
//! Rows use F(`M`, `R`) and columns F(`N`, `S`); the transform domain is
//! `A x B` with `A = M + R - 1` and `B = N + S - 1`.

use super::coefficients::{Coefficients, Minimal};
use crate::dtype::Element;
use crate::helpers::RegisterTile2D;

/// A filter tile in the spatial domain
pub(crate) type FilterTile<T, const R: usize, const S: usize> = RegisterTile2D<T, R, S>;
/// An input patch, or any tile in the transform domain
pub(crate) type TransformTile<T, const A: usize, const B: usize> = RegisterTile2D<T, A, B>;
/// An output tile in the spatial domain
pub(crate) type OutputTile<T, const M: usize, const N: usize> = RegisterTile2D<T, M, N>;

/// `left * tile * right^T`
#[inline]
fn sandwich<T: Element, const P: usize, const K: usize, const L: usize, const Q: usize>(
    left: &[[f64; K]; P],
    tile: &RegisterTile2D<T, K, L>,
    right: &[[f64; L]; Q],
) -> RegisterTile2D<T, P, Q> {
    let mut half = RegisterTile2D::<T, P, L>::zeros();
    for p in 0..P {
        for k in 0..K {
            let coef = left[p][k];
            if coef == 0.0 {
                continue;
            }
            let coef = T::from_f64(coef);
            for l in 0..L {
                half[(p, l)] = coef.mad(tile[(k, l)], half[(p, l)]);
            }
        }
    }
    let mut out = RegisterTile2D::<T, P, Q>::zeros();
    for q in 0..Q {
        for l in 0..L {
            let coef = right[q][l];
            if coef == 0.0 {
                continue;
            }
            let coef = T::from_f64(coef);
            for p in 0..P {
                out[(p, q)] = coef.mad(half[(p, l)], out[(p, q)]);
            }
        }
    }
    out
}

/// `U = G_r g G_c^T`
#[inline]
pub(crate) fn transform_filter<
    T: Element,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
>(
    filter: &FilterTile<T, R, S>,
) -> TransformTile<T, A, B>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    sandwich(
        &<Minimal as Coefficients<M, R, A>>::G,
        filter,
        &<Minimal as Coefficients<N, S, B>>::G,
    )
}

/// `V = B_r^T d B_c`
#[inline]
pub(crate) fn transform_input<
    T: Element,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
>(
    input: &TransformTile<T, A, B>,
) -> TransformTile<T, A, B>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    sandwich(
        &<Minimal as Coefficients<M, R, A>>::BT,
        input,
        &<Minimal as Coefficients<N, S, B>>::BT,
    )
}

/// `Y = A_r^T m A_c`
#[inline]
pub(crate) fn transform_output<
    T: Element,
    const M: usize,
    const N: usize,
    const R: usize,
    const S: usize,
    const A: usize,
    const B: usize,
>(
    intermediate: &TransformTile<T, A, B>,
) -> OutputTile<T, M, N>
where
    Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
{
    sandwich(
        &<Minimal as Coefficients<M, R, A>>::AT,
        intermediate,
        &<Minimal as Coefficients<N, S, B>>::AT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlate<
        const M: usize,
        const N: usize,
        const R: usize,
        const S: usize,
        const A: usize,
        const B: usize,
    >(
        input: &TransformTile<f64, A, B>,
        filter: &FilterTile<f64, R, S>,
    ) -> OutputTile<f64, M, N>
    where
        Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
    {
        let u = transform_filter::<f64, M, N, R, S, A, B>(filter);
        let v = transform_input::<f64, M, N, R, S, A, B>(input);
        let product = RegisterTile2D::from_fn(|a, b| u[(a, b)] * v[(a, b)]);
        transform_output::<f64, M, N, R, S, A, B>(&product)
    }

    #[test]
    fn test_large_tile_box_filter() {
        let input = TransformTile::<f64, 6, 6>::from_fn(|r, c| (r * 6 + c + 1) as f64);
        let ones = FilterTile::<f64, 3, 3>::from_fn(|_, _| 1.0);
        let out = correlate::<4, 4, 3, 3, 6, 6>(&input, &ones);
        for r in 0..4 {
            for c in 0..4 {
                // a 3x3 box over 1..=36 centred on (r+1, c+1)
                let expected = 9.0 * ((r + 1) * 6 + (c + 1) + 1) as f64;
                assert!((out[(r, c)] - expected).abs() < 1e-9, "({r},{c}) {}", out[(r, c)]);
            }
        }
    }

    #[test]
    fn test_mixed_configurations_match_correlation() {
        fn check<
            const M: usize,
            const N: usize,
            const R: usize,
            const S: usize,
            const A: usize,
            const B: usize,
        >()
        where
            Minimal: Coefficients<M, R, A> + Coefficients<N, S, B>,
        {
            let input =
                TransformTile::<f64, A, B>::from_fn(|r, c| ((r * 7 + c * 3) % 5) as f64 - 1.5);
            let filter = FilterTile::<f64, R, S>::from_fn(|r, c| {
                0.25 * (r as f64) - 0.5 * (c as f64) + 1.0
            });
            let out = correlate::<M, N, R, S, A, B>(&input, &filter);
            for i in 0..M {
                for j in 0..N {
                    let mut expected = 0.0;
                    for r in 0..R {
                        for s in 0..S {
                            expected += input[(i + r, j + s)] * filter[(r, s)];
                        }
                    }
                    assert!((out[(i, j)] - expected).abs() < 1e-9, "F({M}x{N},{R}x{S})");
                }
            }
        }
        check::<2, 2, 3, 3, 4, 4>();
        check::<2, 1, 3, 1, 4, 1>();
        check::<1, 2, 1, 3, 1, 4>();
        check::<3, 3, 2, 2, 4, 4>();
        check::<3, 1, 2, 1, 4, 1>();
        check::<1, 3, 1, 2, 1, 4>();
        check::<3, 3, 3, 3, 5, 5>();
    }
}
