//! Workspace sizing, minibatching and reuse.

mod common;

use common::{assert_allclose_f64, random_buffers, reference, run};
use convkit::conv2d::{
    Algorithm, Conv2DParams, ConvType, DefaultSelector, FilterGradient, Forward, GroupFormat,
    InputGradient, query_workspace_size, workspace_size,
};
use convkit::error::StatusCode;

fn scratch_algorithms() -> [(Algorithm, Conv2DParams); 4] {
    [
        (
            Algorithm::Im2col,
            Conv2DParams::new(5, 7, 6, 3, 3, 3, 4).with_padding(1, 1),
        ),
        (
            Algorithm::Im2col,
            Conv2DParams::new(4, 6, 6, 4, 3, 3, 6)
                .with_padding(1, 1)
                .with_groups(2, GroupFormat::Strided),
        ),
        (
            Algorithm::Winograd,
            Conv2DParams::new(5, 7, 7, 3, 3, 3, 4).with_padding(1, 1),
        ),
        (
            Algorithm::WinogradLarge,
            Conv2DParams::new(3, 9, 9, 2, 3, 3, 3).with_padding(1, 1),
        ),
    ]
}

/// Run with a workspace of `len` elements and compare against the reference.
fn check_with_workspace<C: ConvType>(algorithm: Algorithm, params: &Conv2DParams, len: usize) {
    let (input, filter) = random_buffers::<C>(params, 17);
    let expected = reference::<C>(params, &input, &filter);
    let mut workspace = vec![f64::NAN; len];
    let actual = run::<C>(algorithm, params, &input, &filter, &mut workspace).unwrap();
    assert_allclose_f64(
        &actual,
        &expected,
        1e-9,
        1e-9,
        &format!("{algorithm:?} {:?} with {len} workspace elements", C::DIRECTION),
    );
}

fn check_minibatches<C: ConvType>(algorithm: Algorithm, params: &Conv2DParams) {
    let size = workspace_size::<C>(algorithm, params);
    assert!(size.required_size > 0);
    assert!(size.recommended_size >= size.required_size);
    // one image at a time, an uneven split, and the whole batch
    let per_image = (size.recommended_size - size.required_size) / (params.batch - 1);
    for len in [
        size.required_size,
        size.required_size + per_image + 1,
        size.recommended_size,
    ] {
        check_with_workspace::<C>(algorithm, params, len);
    }
}

#[test]
fn test_minibatches_match_single_pass() {
    for (algorithm, params) in scratch_algorithms() {
        check_minibatches::<Forward>(algorithm, &params);
        if params.groups == 1 {
            check_minibatches::<InputGradient>(algorithm, &params);
            check_minibatches::<FilterGradient>(algorithm, &params);
        }
    }
}

#[test]
fn test_insufficient_workspace() {
    for (algorithm, params) in scratch_algorithms() {
        let size = workspace_size::<Forward>(algorithm, &params);
        let (input, filter) = random_buffers::<Forward>(&params, 3);
        let mut workspace = vec![0.0; size.required_size - 1];
        let err = run::<Forward>(algorithm, &params, &input, &filter, &mut workspace).unwrap_err();
        assert_eq!(err.status(), StatusCode::InsufficientWorkspace, "{algorithm:?}");
    }
}

#[test]
fn test_reused_workspace() {
    let params = Conv2DParams::new(3, 8, 8, 3, 3, 3, 5).with_padding(1, 1);
    for algorithm in [Algorithm::Im2col, Algorithm::Winograd] {
        let size = workspace_size::<FilterGradient>(algorithm, &params);
        let (input, grad) = random_buffers::<FilterGradient>(&params, 8);
        let mut workspace = vec![0.0; size.required_size];
        let first =
            run::<FilterGradient>(algorithm, &params, &input, &grad, &mut workspace).unwrap();
        let second =
            run::<FilterGradient>(algorithm, &params, &input, &grad, &mut workspace).unwrap();
        assert_eq!(first, second, "{algorithm:?}");
    }
}

#[test]
fn test_scratch_free_algorithms() {
    let params = Conv2DParams::new(2, 6, 6, 4, 3, 3, 4).with_padding(1, 1);
    for algorithm in [Algorithm::Direct, Algorithm::Tiled, Algorithm::NotSupported] {
        let size = workspace_size::<Forward>(algorithm, &params);
        assert_eq!(size.required_size, 0);
        assert_eq!(size.recommended_size, 0);
    }
    let pointwise = Conv2DParams::new(2, 6, 6, 4, 1, 1, 4);
    assert_eq!(
        workspace_size::<Forward>(Algorithm::Matmul, &pointwise).recommended_size,
        0
    );
}

#[test]
fn test_query_follows_selection() {
    let params = Conv2DParams::new(4, 10, 10, 8, 3, 3, 8).with_padding(1, 1);
    let queried = query_workspace_size::<Forward, _>(&params, &mut DefaultSelector);
    assert_eq!(
        queried,
        workspace_size::<Forward>(Algorithm::Winograd, &params)
    );

    let pointwise = Conv2DParams::new(4, 10, 10, 8, 1, 1, 8);
    let queried = query_workspace_size::<InputGradient, _>(&pointwise, &mut DefaultSelector);
    assert_eq!(queried.required_size, 0);
}
