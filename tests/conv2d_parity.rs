//! Every algorithm against a naive reference convolution, in every direction
//! it supports.

mod common;

use common::{check_against_reference, random_buffers, run, run_with};
use convkit::conv2d::{
    Algorithm, Conv2DParams, DataFormat, FilterFormat, FilterGradient, Forward, GroupFormat,
    InputGradient, LaunchOptions,
};
use convkit::error::StatusCode;

fn check_all_directions(algorithm: Algorithm, params: &Conv2DParams, seed: u64) {
    check_against_reference::<Forward>(algorithm, params, seed);
    check_against_reference::<InputGradient>(algorithm, params, seed + 10);
    check_against_reference::<FilterGradient>(algorithm, params, seed + 20);
}

fn direct_shapes() -> Vec<Conv2DParams> {
    vec![
        Conv2DParams::new(2, 7, 6, 3, 3, 3, 4).with_padding(1, 1),
        Conv2DParams::new(2, 9, 8, 4, 3, 3, 8).with_stride(2, 2),
        Conv2DParams::new(1, 11, 10, 2, 5, 5, 3)
            .with_stride(2, 2)
            .with_padding(2, 2),
        Conv2DParams::new(3, 6, 7, 5, 3, 1, 2).with_padding(1, 0),
        Conv2DParams::new(1, 5, 5, 4, 1, 1, 6),
        // padding wider than the window, so the mirrored padding is negative
        Conv2DParams::new(1, 4, 5, 2, 2, 2, 2).with_padding(2, 2),
        Conv2DParams::new(2, 6, 6, 3, 4, 2, 5)
            .with_stride(3, 1)
            .with_padding(1, 0),
    ]
}

#[test]
fn test_direct_matches_reference() {
    for (i, params) in direct_shapes().iter().enumerate() {
        check_all_directions(Algorithm::Direct, params, 100 * i as u64);
    }
}

#[test]
fn test_direct_other_layouts() {
    let base = Conv2DParams::new(2, 6, 5, 3, 3, 3, 4).with_padding(1, 1);
    let nchw = base.with_formats(DataFormat::Nchw, FilterFormat::Fchw);
    check_all_directions(Algorithm::Direct, &nchw, 7);
    let fhwc = base
        .with_stride(2, 1)
        .with_formats(DataFormat::Nhwc, FilterFormat::Fhwc);
    check_all_directions(Algorithm::Direct, &fhwc, 8);
}

#[test]
fn test_direct_without_specialisation() {
    let params = Conv2DParams::new(2, 8, 8, 4, 3, 3, 4).with_padding(1, 1);
    let options = LaunchOptions {
        use_fast_div: false,
        static_direct: false,
        vectorise: false,
        ..LaunchOptions::default()
    };
    let (input, filter) = random_buffers::<Forward>(&params, 3);
    let tuned = run::<Forward>(Algorithm::Direct, &params, &input, &filter, &mut []).unwrap();
    let plain = run_with::<Forward>(
        Algorithm::Direct,
        &params,
        &input,
        &filter,
        &mut [],
        &options,
    )
    .unwrap();
    common::assert_allclose_f64(&plain, &tuned, 1e-12, 1e-12, "dynamic vs specialised");
}

#[test]
fn test_direct_reduced_filter_gradient() {
    let params = Conv2DParams::new(3, 9, 9, 3, 3, 3, 2).with_padding(1, 1);
    let options = LaunchOptions {
        reduction_threshold: 1,
        workgroup_size: 16,
        ..LaunchOptions::default()
    };
    let (input, grad) = random_buffers::<FilterGradient>(&params, 41);
    let expected = common::reference::<FilterGradient>(&params, &input, &grad);
    let reduced = run_with::<FilterGradient>(
        Algorithm::Direct,
        &params,
        &input,
        &grad,
        &mut [],
        &options,
    )
    .unwrap();
    common::assert_allclose_f64(&reduced, &expected, 1e-9, 1e-9, "reduced filter gradient");

    let odd_group = LaunchOptions {
        workgroup_size: 12,
        ..options
    };
    let err = run_with::<FilterGradient>(
        Algorithm::Direct,
        &params,
        &input,
        &grad,
        &mut [],
        &odd_group,
    )
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidParameter);
}

#[test]
fn test_im2col_matches_reference() {
    for (i, params) in direct_shapes().iter().enumerate() {
        check_all_directions(Algorithm::Im2col, params, 1000 + 100 * i as u64);
    }
    let fhwc = Conv2DParams::new(2, 6, 5, 3, 3, 3, 4)
        .with_padding(1, 0)
        .with_formats(DataFormat::Nhwc, FilterFormat::Fhwc);
    check_all_directions(Algorithm::Im2col, &fhwc, 77);
}

#[test]
fn test_im2col_grouped_forward() {
    for format in [GroupFormat::Contiguous, GroupFormat::Strided] {
        let params = Conv2DParams::new(2, 6, 6, 6, 3, 3, 9)
            .with_padding(1, 1)
            .with_groups(3, format);
        check_against_reference::<Forward>(Algorithm::Im2col, &params, 5);

        let depthwise = Conv2DParams::new(1, 5, 5, 4, 3, 3, 8)
            .with_stride(2, 2)
            .with_groups(4, format);
        check_against_reference::<Forward>(Algorithm::Im2col, &depthwise, 6);
    }
}

#[test]
fn test_im2col_rejections() {
    let grouped = Conv2DParams::new(1, 6, 6, 4, 3, 3, 4).with_groups(2, GroupFormat::Contiguous);
    let (input, filter) = random_buffers::<InputGradient>(&grouped, 1);
    let err =
        run::<InputGradient>(Algorithm::Im2col, &grouped, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);

    let nchw = Conv2DParams::new(1, 6, 6, 4, 3, 3, 4)
        .with_formats(DataFormat::Nchw, FilterFormat::Fchw);
    let (input, filter) = random_buffers::<Forward>(&nchw, 2);
    let err = run::<Forward>(Algorithm::Im2col, &nchw, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);
}

#[test]
fn test_tiled_matches_reference() {
    let shapes = [
        // (window, stride, channels, features)
        (1, 1, 3, 4),
        (1, 1, 3, 3),
        (1, 2, 2, 4),
        (1, 2, 2, 5),
        (3, 1, 3, 4),
        (3, 1, 2, 3),
        (3, 2, 3, 4),
        (3, 2, 3, 6),
        (3, 2, 3, 5),
        (5, 1, 2, 2),
        (5, 1, 3, 3),
    ];
    for (i, &(window, stride, channels, features)) in shapes.iter().enumerate() {
        let pad = (window / 2) as isize;
        let params = Conv2DParams::new(2, 9, 10, channels, window, window, features)
            .with_stride(stride, stride)
            .with_padding(pad, pad);
        check_against_reference::<Forward>(Algorithm::Tiled, &params, 300 + i as u64);
        check_against_reference::<InputGradient>(Algorithm::Tiled, &params, 400 + i as u64);
    }
}

#[test]
fn test_tiled_rejections() {
    let params = Conv2DParams::new(1, 8, 8, 2, 3, 3, 4);
    let (input, grad) = random_buffers::<FilterGradient>(&params, 9);
    let err = run::<FilterGradient>(Algorithm::Tiled, &params, &input, &grad, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);

    let wide = Conv2DParams::new(1, 8, 8, 2, 7, 7, 4);
    let (input, filter) = random_buffers::<Forward>(&wide, 10);
    let err = run::<Forward>(Algorithm::Tiled, &wide, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);
}

#[test]
fn test_winograd_matches_reference() {
    let shapes = [
        Conv2DParams::new(2, 7, 7, 3, 3, 3, 4).with_padding(1, 1),
        Conv2DParams::new(1, 8, 6, 4, 3, 3, 2),
        Conv2DParams::new(2, 5, 9, 2, 3, 1, 3).with_padding(1, 0),
        Conv2DParams::new(1, 6, 7, 3, 1, 3, 5).with_padding(0, 1),
        Conv2DParams::new(1, 3, 3, 8, 3, 3, 8).with_padding(1, 1),
        // padding past the window edge
        Conv2DParams::new(1, 4, 4, 2, 3, 3, 2).with_padding(3, 3),
    ];
    for (i, params) in shapes.iter().enumerate() {
        check_all_directions(Algorithm::Winograd, params, 500 + 100 * i as u64);
    }
}

#[test]
fn test_winograd_large_matches_reference() {
    let shapes = [
        Conv2DParams::new(2, 9, 10, 3, 3, 3, 4).with_padding(1, 1),
        Conv2DParams::new(1, 6, 6, 2, 3, 3, 2),
        Conv2DParams::new(1, 13, 11, 4, 3, 3, 6).with_padding(1, 1),
    ];
    for (i, params) in shapes.iter().enumerate() {
        check_all_directions(Algorithm::WinogradLarge, params, 900 + 100 * i as u64);
    }
}

#[test]
fn test_winograd_rejections() {
    let strided = Conv2DParams::new(1, 8, 8, 2, 3, 3, 2).with_stride(2, 2);
    let (input, filter) = random_buffers::<Forward>(&strided, 1);
    let err = run::<Forward>(Algorithm::Winograd, &strided, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);

    let rect = Conv2DParams::new(1, 8, 8, 2, 3, 1, 2);
    let (input, filter) = random_buffers::<Forward>(&rect, 2);
    let err =
        run::<Forward>(Algorithm::WinogradLarge, &rect, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);
}

#[test]
fn test_matmul_matches_reference() {
    let params = Conv2DParams::new(3, 4, 5, 6, 1, 1, 7);
    check_all_directions(Algorithm::Matmul, &params, 61);

    let padded = params.with_padding(1, 1);
    let (input, filter) = random_buffers::<Forward>(&padded, 62);
    let err = run::<Forward>(Algorithm::Matmul, &padded, &input, &filter, &mut []).unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidAlgorithm);
}

#[test]
fn test_grouped_needs_im2col() {
    let params = Conv2DParams::new(1, 6, 6, 4, 3, 3, 4).with_groups(2, GroupFormat::Strided);
    let (input, filter) = random_buffers::<Forward>(&params, 3);
    for algorithm in [Algorithm::Direct, Algorithm::Tiled, Algorithm::Winograd] {
        let err = run::<Forward>(algorithm, &params, &input, &filter, &mut []).unwrap_err();
        assert_eq!(err.status(), StatusCode::InvalidAlgorithm, "{algorithm:?}");
    }
}

#[cfg(feature = "f16")]
fn check_f16<C: convkit::conv2d::ConvType>(algorithm: Algorithm, params: &Conv2DParams) {
    use convkit::backend::CompletionToken;
    use convkit::conv2d::{ConstantSelector, get_sizes, launch};
    use half::f16;

    let (input, filter) = random_buffers::<C>(params, 71);
    let input: Vec<f16> = input.iter().map(|&v| f16::from_f64(v)).collect();
    let filter: Vec<f16> = filter.iter().map(|&v| f16::from_f64(v)).collect();
    // reference on the rounded values, so only accumulation error remains
    let expected = common::reference::<C>(
        params,
        &input.iter().map(|v| v.to_f64()).collect::<Vec<_>>(),
        &filter.iter().map(|v| v.to_f64()).collect::<Vec<_>>(),
    );

    let mut output = vec![f16::NAN; get_sizes::<C>(params).output_size];
    let backend = common::create_cpu_backend();
    let event = launch::<f16, C, _, _>(
        &input,
        &filter,
        &mut output,
        &mut [],
        params,
        &mut ConstantSelector(algorithm),
        &backend,
        &LaunchOptions::default(),
        &[],
    )
    .unwrap();
    event.wait();
    let actual: Vec<f64> = output.iter().map(|v| v.to_f64()).collect();
    common::assert_allclose_f64(
        &actual,
        &expected,
        5e-2,
        1e-1,
        &format!("f16 {algorithm:?} {:?}", C::DIRECTION),
    );
}

#[cfg(feature = "f16")]
#[test]
fn test_f16_matches_reference() {
    let params = Conv2DParams::new(1, 5, 5, 2, 3, 3, 2).with_padding(1, 1);
    for algorithm in [Algorithm::Direct, Algorithm::Winograd, Algorithm::Im2col] {
        check_f16::<Forward>(algorithm, &params);
        check_f16::<InputGradient>(algorithm, &params);
        check_f16::<FilterGradient>(algorithm, &params);
    }
}
