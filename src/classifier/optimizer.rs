//! Adam optimizer over ndarray parameters of any shape.

use ndarray::{Array, Dimension, Zip};

use crate::error::{Error, Result};

/// First and second moment buffers for one parameter tensor.
#[derive(Debug, Clone)]
pub struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    pub fn zeros_like(params: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(params.raw_dim()),
            v: Array::zeros(params.raw_dim()),
        }
    }
}

/// Adam optimizer
///
/// 1. m_t = beta1 * m_{t-1} + (1 - beta1) * g_t
/// 2. v_t = beta2 * v_{t-1} + (1 - beta2) * g_t^2
/// 3. m_hat = m_t / (1 - beta1^t), v_hat = v_t / (1 - beta2^t)
/// 4. params = params - lr * m_hat / (sqrt(v_hat) + epsilon)
///
/// The timestep is shared by every parameter of the model: call
/// [`Adam::begin_step`] once per optimization step, then [`Adam::update`]
/// for each tensor.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
        }
    }

    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    pub fn update<D: Dimension>(
        &self,
        params: &mut Array<f32, D>,
        grads: &Array<f32, D>,
        moments: &mut Moments<D>,
    ) -> Result<()> {
        if params.shape() != grads.shape() || params.shape() != moments.m.shape() {
            return Err(Error::Training(format!(
                "gradient shape {:?} does not match parameter shape {:?}",
                grads.shape(),
                params.shape()
            )));
        }
        if self.t == 0 {
            return Err(Error::Training("Adam::update called before begin_step".to_string()));
        }

        let (beta1, beta2) = (self.beta1, self.beta2);
        let bias_correction1 = 1.0 - beta1.powi(self.t);
        let bias_correction2 = 1.0 - beta2.powi(self.t);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        Zip::from(params)
            .and(grads)
            .and(&mut moments.m)
            .and(&mut moments.v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });

        Ok(())
    }
}
