//! Common test utilities
#![allow(dead_code)]

use convkit::backend::CompletionToken;
use convkit::backend::cpu::{CpuBackend, CpuConfig};
use convkit::conv2d::{
    Algorithm, ConstantSelector, Conv2DParams, ConvType, DataFormat, Direction, FilterFormat,
    GroupFormat, LaunchOptions, get_sizes, launch,
};
use convkit::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Uniform;

/// Create a CPU backend for testing.
///
/// A small parallel grain makes even tiny launches go through rayon.
pub fn create_cpu_backend() -> CpuBackend {
    CpuBackend::with_config(CpuConfig {
        min_parallel_len: 4,
    })
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Uniform values in `[-1, 1)` from a fixed seed
pub fn random_data(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(-1.0, 1.0).unwrap();
    (0..len).map(|_| rng.sample(dist)).collect()
}

/// f32 copy of `data`
pub fn to_f32(data: &[f64]) -> Vec<f32> {
    data.iter().map(|&x| x as f32).collect()
}

fn image_index(
    format: DataFormat,
    [rows, cols, channels]: [usize; 3],
    [b, r, c, ch]: [usize; 4],
) -> usize {
    match format {
        DataFormat::Nhwc => ((b * rows + r) * cols + c) * channels + ch,
        DataFormat::Nchw => ((b * channels + ch) * rows + r) * cols + c,
    }
}

fn filter_index(
    format: FilterFormat,
    [rows, cols, channels, features]: [usize; 4],
    [r, c, ch, f]: [usize; 4],
) -> usize {
    match format {
        FilterFormat::Hwcf => ((r * cols + c) * channels + ch) * features + f,
        FilterFormat::Fchw => ((f * channels + ch) * rows + r) * cols + c,
        FilterFormat::Fhwc => ((f * rows + r) * cols + c) * channels + ch,
    }
}

/// Naive convolution of direction `C` in f64, with the buffer roles of
/// [`get_sizes`]: Forward takes `(x, w)`, InputGradient `(dy, w)` and
/// FilterGradient `(x, dy)`.
pub fn reference<C: ConvType>(p: &Conv2DParams, input: &[f64], filter: &[f64]) -> Vec<f64> {
    let sizes = get_sizes::<C>(p);
    let mut out = vec![0.0; sizes.output_size];
    let groups = p.groups;
    let cg = p.channels / groups;
    let fg = p.features / groups;
    let in_shape = [p.in_rows, p.in_cols, p.channels];
    let out_shape = [p.out_rows, p.out_cols, p.features];
    let filter_shape = [p.window_rows, p.window_cols, cg, p.features];

    for b in 0..p.batch {
        for or in 0..p.out_rows {
            for oc in 0..p.out_cols {
                for f in 0..p.features {
                    let group = match p.group_format {
                        GroupFormat::Contiguous => f / fg,
                        GroupFormat::Strided => f % groups,
                    };
                    let y = image_index(p.input_format, out_shape, [b, or, oc, f]);
                    for kr in 0..p.window_rows {
                        let r = (or * p.stride_rows + kr) as isize - p.pad_rows;
                        if r < 0 || r >= p.in_rows as isize {
                            continue;
                        }
                        for kc in 0..p.window_cols {
                            let c = (oc * p.stride_cols + kc) as isize - p.pad_cols;
                            if c < 0 || c >= p.in_cols as isize {
                                continue;
                            }
                            for local in 0..cg {
                                let ch = match p.group_format {
                                    GroupFormat::Contiguous => group * cg + local,
                                    GroupFormat::Strided => local * groups + group,
                                };
                                let x = image_index(
                                    p.input_format,
                                    in_shape,
                                    [b, r as usize, c as usize, ch],
                                );
                                let w = filter_index(
                                    p.filter_format,
                                    filter_shape,
                                    [kr, kc, local, f],
                                );
                                match C::DIRECTION {
                                    Direction::Forward => out[y] += input[x] * filter[w],
                                    Direction::InputGradient => out[x] += input[y] * filter[w],
                                    Direction::FilterGradient => out[w] += input[x] * filter[y],
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Run direction `C` with `algorithm` on the CPU backend in f64.
pub fn run<C: ConvType>(
    algorithm: Algorithm,
    params: &Conv2DParams,
    input: &[f64],
    filter: &[f64],
    workspace: &mut [f64],
) -> Result<Vec<f64>> {
    run_with::<C>(
        algorithm,
        params,
        input,
        filter,
        workspace,
        &LaunchOptions::default(),
    )
}

/// As [`run`], with explicit launch options.
pub fn run_with<C: ConvType>(
    algorithm: Algorithm,
    params: &Conv2DParams,
    input: &[f64],
    filter: &[f64],
    workspace: &mut [f64],
    options: &LaunchOptions,
) -> Result<Vec<f64>> {
    let backend = create_cpu_backend();
    let mut output = vec![f64::NAN; get_sizes::<C>(params).output_size];
    let event = launch::<f64, C, _, _>(
        input,
        filter,
        &mut output,
        workspace,
        params,
        &mut ConstantSelector(algorithm),
        &backend,
        options,
        &[],
    )?;
    event.wait();
    Ok(output)
}

/// Random buffers for direction `C`, seeded from `seed`.
pub fn random_buffers<C: ConvType>(params: &Conv2DParams, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let sizes = get_sizes::<C>(params);
    (
        random_data(sizes.input_size, seed),
        random_data(sizes.filter_size, seed + 1),
    )
}

/// Check `algorithm` against [`reference`] for direction `C`.
pub fn check_against_reference<C: ConvType>(
    algorithm: Algorithm,
    params: &Conv2DParams,
    seed: u64,
) {
    let (input, filter) = random_buffers::<C>(params, seed);
    let expected = reference::<C>(params, &input, &filter);
    let actual = run::<C>(algorithm, params, &input, &filter, &mut [])
        .unwrap_or_else(|e| panic!("{algorithm:?} {:?} on {params:?}: {e}", C::DIRECTION));
    assert_allclose_f64(
        &actual,
        &expected,
        1e-9,
        1e-9,
        &format!("{algorithm:?} {:?} {params:?}", C::DIRECTION),
    );
}
