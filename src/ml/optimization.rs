//! Derivative-free minimisation for likelihood fitting.

/// Nelder-Mead settings
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    /// Stop once the spread of objective values across the simplex is below this
    pub tolerance: f64,
    /// ...and every vertex lies within this distance of the best one (max norm)
    pub x_tolerance: f64,
    /// Initial simplex step, relative to the starting coordinate when it is non-zero
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-8,
            x_tolerance: 1e-6,
            initial_step: 0.05,
        }
    }
}

/// Outcome of a Nelder-Mead run
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ALPHA: f64 = 1.0; // reflection
const GAMMA: f64 = 2.0; // expansion
const RHO: f64 = 0.5; // contraction
const SIGMA: f64 = 0.5; // shrink

/// Minimise `objective` starting from `initial`.
///
/// Non-finite objective values are treated as +inf so the simplex walks
/// away from regions where the likelihood cannot be evaluated.
pub fn nelder_mead<F>(objective: F, initial: &[f64], config: &NelderMeadConfig) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            point: vec![],
            value: eval(initial),
            iterations: 0,
            converged: true,
        };
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(initial.to_vec());
    for i in 0..n {
        let mut vertex = initial.to_vec();
        let step = if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        // Vertices straddling a minimum can share a value, so the spread of
        // values alone does not mean the simplex has collapsed
        if values[best].is_finite()
            && (values[worst] - values[best]).abs() < config.tolerance
            && simplex_radius(&simplex, best) < config.x_tolerance
        {
            converged = true;
            break;
        }

        let centroid = centroid_without(&simplex, worst);

        let reflected = towards(&centroid, &simplex[worst], -ALPHA);
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = towards(&centroid, &simplex[worst], -GAMMA);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, contracted_value) = if reflected_value < values[worst] {
            let c = towards(&centroid, &reflected, RHO);
            let v = eval(&c);
            (c, v)
        } else {
            let c = towards(&centroid, &simplex[worst], RHO);
            let v = eval(&c);
            (c, v)
        };

        if contracted_value < values[worst].min(reflected_value) {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        // Shrink every vertex towards the best one
        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            simplex[i] = towards(&anchor, &simplex[i], SIGMA);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

/// Largest max-norm distance from the best vertex
fn simplex_radius(simplex: &[Vec<f64>], best: usize) -> f64 {
    simplex
        .iter()
        .flat_map(|vertex| vertex.iter().zip(&simplex[best]).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max)
}

fn centroid_without(simplex: &[Vec<f64>], skip: usize) -> Vec<f64> {
    let n = simplex[0].len();
    let mut c = vec![0.0; n];
    for (i, vertex) in simplex.iter().enumerate() {
        if i == skip {
            continue;
        }
        for (acc, x) in c.iter_mut().zip(vertex) {
            *acc += x;
        }
    }
    let k = (simplex.len() - 1) as f64;
    c.iter_mut().for_each(|x| *x /= k);
    c
}

/// `from + t * (to - from)`
fn towards(from: &[f64], to: &[f64], t: f64) -> Vec<f64> {
    from.iter().zip(to).map(|(a, b)| a + t * (b - a)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimises_quadratic() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 3.0).powi(2),
            &[0.0, 0.0],
            &NelderMeadConfig::default(),
        );

        assert!(result.converged);
        assert!((result.point[0] - 2.0).abs() < 1e-3);
        assert!((result.point[1] + 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_minimises_rosenbrock() {
        let config = NelderMeadConfig {
            max_iter: 5000,
            tolerance: 1e-12,
            ..NelderMeadConfig::default()
        };
        let result = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
            &config,
        );

        assert!((result.point[0] - 1.0).abs() < 5e-2);
        assert!((result.point[1] - 1.0).abs() < 5e-2);
    }

    #[test]
    fn test_symmetric_vertices_do_not_stop_the_search() {
        // Two vertices at equal distance either side of the minimum share a value
        let result = nelder_mead(|x| (x[0] - 1.0).powi(2), &[0.5], &NelderMeadConfig::default());

        assert!(result.converged);
        assert!((result.point[0] - 1.0).abs() < 1e-3, "{:?}", result.point);
    }

    #[test]
    fn test_steps_away_from_nan_region() {
        // NaN for x < 0 must not poison the simplex
        let result = nelder_mead(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) },
            &[0.5],
            &NelderMeadConfig::default(),
        );
        assert!(result.value.is_finite());
        assert!((result.point[0] - 1.0).abs() < 1e-3);
    }
}
