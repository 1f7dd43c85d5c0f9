use adskalman::{CovarianceUpdateMethod, ObservationModel, StateAndCovariance};
use nalgebra::core::dimension::U4;
use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};

use crate::motion_model_2d::ConstantVelocity2DModel;
use crate::observation_model_2d::ObservationModel2D;
use crate::{Error, Result};

/// Noise and prior parameters for a [`PositionFilter`].
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    /// Scale of the white-acceleration process noise, px^2/s^3.
    pub motion_noise_scale: f64,
    /// Isotropic measurement noise variance, px^2.
    pub observation_noise: f64,
    /// Prior position variance at birth, px^2.
    pub initial_position_variance: f64,
    /// Prior velocity variance at birth, (px/s)^2. Wide: velocity is
    /// unknown at birth.
    pub initial_velocity_variance: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            motion_noise_scale: 100.0,
            observation_noise: 10.0,
            initial_position_variance: 100.0,
            initial_velocity_variance: 2500.0,
        }
    }
}

/// Per-object constant-velocity Kalman filter over image-plane position.
///
/// Wraps the motion and observation models with the state they operate on so
/// the tracker can treat each object's filter as a value.
#[derive(Debug)]
pub struct PositionFilter {
    motion: ConstantVelocity2DModel<f64>,
    observation: ObservationModel2D<f64>,
    params: FilterParams,
    estimate: StateAndCovariance<f64, U4>,
}

impl PositionFilter {
    pub fn new(x: f64, y: f64, params: FilterParams) -> Self {
        let motion = ConstantVelocity2DModel::new(params.motion_noise_scale);
        let observation =
            ObservationModel2D::new(Matrix2::identity() * params.observation_noise);
        let estimate = Self::birth_estimate(x, y, &params);
        Self {
            motion,
            observation,
            params,
            estimate,
        }
    }

    fn birth_estimate(x: f64, y: f64, params: &FilterParams) -> StateAndCovariance<f64, U4> {
        let state = Vector4::new(x, y, 0.0, 0.0);
        let covariance = Matrix4::from_diagonal(&Vector4::new(
            params.initial_position_variance,
            params.initial_position_variance,
            params.initial_velocity_variance,
            params.initial_velocity_variance,
        ));
        StateAndCovariance::new(state, covariance)
    }

    /// Advance the estimate by `dt` seconds without an observation.
    pub fn predict(&mut self, dt: f64) {
        let model = self.motion.calc_for_dt(dt);
        use adskalman::TransitionModelLinearNoControl;
        self.estimate = model.predict(&self.estimate);
    }

    /// Position `dt` seconds ahead of the current estimate, without
    /// advancing it.
    pub fn predicted_position(&self, dt: f64) -> Vector2<f64> {
        let state = self.estimate.state();
        Vector2::new(state[0] + state[2] * dt, state[1] + state[3] * dt)
    }

    /// Fold in a position measurement.
    pub fn correct(&mut self, x: f64, y: f64) -> Result<()> {
        let observation = Vector2::new(x, y);
        self.estimate = self
            .observation
            .update(
                &self.estimate,
                &observation,
                CovarianceUpdateMethod::JosephForm,
            )
            .map_err(|e| Error::CovarianceUpdate(format!("{e}")))?;
        Ok(())
    }

    /// Forget everything and restart the filter at a new position.
    pub fn reset(&mut self, x: f64, y: f64) {
        self.estimate = Self::birth_estimate(x, y, &self.params);
    }

    pub fn position(&self) -> Vector2<f64> {
        let state = self.estimate.state();
        Vector2::new(state[0], state[1])
    }

    pub fn velocity(&self) -> Vector2<f64> {
        let state = self.estimate.state();
        Vector2::new(state[2], state[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stationary_measurements_converge() {
        let mut filter = PositionFilter::new(100.0, 200.0, FilterParams::default());
        for _ in 0..50 {
            filter.predict(1.0 / 30.0);
            filter.correct(100.0, 200.0).unwrap();
        }
        assert_relative_eq!(filter.position().x, 100.0, epsilon = 1e-6);
        assert_relative_eq!(filter.position().y, 200.0, epsilon = 1e-6);
        assert_relative_eq!(filter.velocity().x, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn constant_velocity_is_learned() {
        let mut filter = PositionFilter::new(0.0, 0.0, FilterParams::default());
        let dt = 1.0 / 30.0;
        // Object moving at 300 px/s along x.
        for i in 1..=120 {
            filter.predict(dt);
            filter.correct(300.0 * dt * i as f64, 0.0).unwrap();
        }
        assert_relative_eq!(filter.velocity().x, 300.0, epsilon = 5.0);
        // Prediction extrapolates along the learned velocity.
        let ahead = filter.predicted_position(0.5);
        assert_relative_eq!(ahead.x, filter.position().x + filter.velocity().x * 0.5);
    }

    #[test]
    fn reset_forgets_velocity() {
        let mut filter = PositionFilter::new(0.0, 0.0, FilterParams::default());
        let dt = 1.0 / 30.0;
        for i in 1..=30 {
            filter.predict(dt);
            filter.correct(10.0 * i as f64, 0.0).unwrap();
        }
        filter.reset(500.0, 500.0);
        assert_relative_eq!(filter.position().x, 500.0);
        assert_relative_eq!(filter.velocity().x, 0.0);
    }
}
