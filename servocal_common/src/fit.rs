use crate::error::CalError;

#[cfg_attr(feature = "no_std", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub multiplier: f32,
    pub offset: f32,
}

/// Streaming ordinary least squares for `y = multiplier * x + offset`.
///
/// Means and co-moments are updated per sample (Welford), so no sample
/// buffer is needed on the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFit {
    n: u32,
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    sxy: f64,
}

impl LinearFit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f32, y: f32) {
        let (x, y) = (x as f64, y as f64);
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        self.mean_y += (y - self.mean_y) / n;
        self.sxx += dx * (x - self.mean_x);
        self.sxy += dx * (y - self.mean_y);
    }

    pub fn len(&self) -> u32 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn solve(&self) -> Result<Line, CalError> {
        if self.n < 2 || !(self.sxx > 0.0) {
            warn!("degenerate fit over {} samples", self.n);
            return Err(CalError::DegenerateFit);
        }
        let multiplier = self.sxy / self.sxx;
        let offset = self.mean_y - multiplier * self.mean_x;
        Ok(Line {
            multiplier: multiplier as f32,
            offset: offset as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_line() {
        let mut fit = LinearFit::new();
        for i in 0..=270 {
            let x = i as f32;
            fit.push(x, 2.0 * x + 5.0);
        }
        let line = fit.solve().unwrap();
        assert_relative_eq!(line.multiplier, 2.0, epsilon = 1e-5);
        assert_relative_eq!(line.offset, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn two_points_define_the_line() {
        let mut fit = LinearFit::new();
        fit.push(0.0, 5.0);
        fit.push(10.0, 25.0);
        let line = fit.solve().unwrap();
        assert_relative_eq!(line.multiplier, 2.0);
        assert_relative_eq!(line.offset, 5.0);
    }

    #[test]
    fn averages_out_symmetric_noise() {
        let mut fit = LinearFit::new();
        for i in 0..100 {
            let x = i as f32;
            let noise = if i % 2 == 0 { 0.3 } else { -0.3 };
            fit.push(x, 0.98 * x - 2.0 + noise);
        }
        let line = fit.solve().unwrap();
        assert_relative_eq!(line.multiplier, 0.98, epsilon = 1e-3);
        assert_relative_eq!(line.offset, -2.0, epsilon = 0.1);
    }

    #[test]
    fn single_sample_is_degenerate() {
        let mut fit = LinearFit::new();
        assert_eq!(fit.solve(), Err(CalError::DegenerateFit));
        fit.push(1.0, 2.0);
        assert_eq!(fit.solve(), Err(CalError::DegenerateFit));
    }

    #[test]
    fn identical_commands_are_degenerate() {
        let mut fit = LinearFit::new();
        for y in [1.0, 2.0, 3.0, 4.0] {
            fit.push(42.0, y);
        }
        assert_eq!(fit.len(), 4);
        assert_eq!(fit.solve(), Err(CalError::DegenerateFit));
    }
}
