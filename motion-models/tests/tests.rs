use approx::assert_relative_eq;

use nalgebra::{Matrix4, Vector4};

use adskalman::{StateAndCovariance, TransitionModelLinearNoControl};

use motion_models::motion_model_2d::ConstantVelocity2DModel;

/// Test that doing updates every frame without observations
/// is equal to doing an update with a longer dt.
#[test]
fn test_missing_frames_via_large_dt() {
    let motion_noise_scale = 1.234;
    let model = ConstantVelocity2DModel::new(motion_noise_scale);

    let dt1 = 5.678;
    let state0 = Vector4::new(1.2, 3.4, 5.6, 7.8);
    let covar0 = 42.0 * Matrix4::<f64>::identity();

    let est0 = StateAndCovariance::new(state0, covar0);

    // Run two time steps of duration dt.
    let mm1 = model.calc_for_dt(dt1);
    let est1_1 = mm1.predict(&est0);
    let est1_2 = mm1.predict(&est1_1);

    // Run one time step of duration 2*dt.
    let mm2 = model.calc_for_dt(2.0 * dt1);
    let est2_2 = mm2.predict(&est0);

    assert_relative_eq!(est1_2.state(), est2_2.state());
    assert_relative_eq!(est1_2.covariance(), est2_2.covariance());
}

/// The transition matrix moves position along velocity.
#[test]
fn test_transition_moves_position() {
    let model = ConstantVelocity2DModel::new(0.0);
    let mm = model.calc_for_dt(0.5);

    let state0 = Vector4::new(10.0, 20.0, 4.0, -2.0);
    let est0 = StateAndCovariance::new(state0, Matrix4::identity());
    let est1 = mm.predict(&est0);

    assert_relative_eq!(est1.state()[0], 12.0);
    assert_relative_eq!(est1.state()[1], 19.0);
    assert_relative_eq!(est1.state()[2], 4.0);
    assert_relative_eq!(est1.state()[3], -2.0);
}
