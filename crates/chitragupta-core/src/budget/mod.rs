//! Token Budget Allocator
//!
//! Splits a fixed context-token budget across the four memory streams
//! (identity, projects, tasks, flow) before prompt assembly. Stream
//! affinities form a 4x4 matrix that Sinkhorn-Knopp normalizes to doubly
//! stochastic; budgets derive from its row sums weighted by the baseline
//! preservation ratios, rounded to integers that conserve the total
//! exactly.

// ============================================================================
// CONSTANTS
// ============================================================================

/// Number of memory streams
pub const STREAM_COUNT: usize = 4;

/// Stream names in fixed order
pub const STREAMS: [&str; STREAM_COUNT] = ["identity", "projects", "tasks", "flow"];

/// Baseline preservation ratios per stream
pub const PRESERVATION_RATIOS: [f64; STREAM_COUNT] = [0.95, 0.70, 0.50, 0.30];

/// Sinkhorn convergence tolerance on row/column sums
pub const SINKHORN_EPSILON: f64 = 1e-5;

/// Sinkhorn iteration cap
pub const SINKHORN_MAX_ITERATIONS: usize = 100;

/// Small prior keeping diagonal entries positive with zero signals
const DIAGONAL_PRIOR: f64 = 0.05;

/// Inter-stream compatibility, symmetric; indexed [row][column].
/// Identity pairs more strongly with projects than with flow; tasks and
/// flow couple through the working set.
const COMPATIBILITY: [[f64; STREAM_COUNT]; STREAM_COUNT] = [
    [0.0, 0.30, 0.20, 0.10],
    [0.30, 0.0, 0.30, 0.15],
    [0.20, 0.30, 0.0, 0.25],
    [0.10, 0.15, 0.25, 0.0],
];

// ============================================================================
// SIGNALS
// ============================================================================

/// Per-stream signal lists gathered before assembly
#[derive(Debug, Clone, Default)]
pub struct StreamSignals {
    /// Identity signals (preferences, facts about the user)
    pub identity: Vec<String>,
    /// Project signals (active files, tools, repos)
    pub projects: Vec<String>,
    /// Task signals (decisions, instructions, open work)
    pub tasks: Vec<String>,
    /// Flow signals (recent conversational turns)
    pub flow: Vec<String>,
}

impl StreamSignals {
    /// Signal counts in stream order
    pub fn counts(&self) -> [usize; STREAM_COUNT] {
        [
            self.identity.len(),
            self.projects.len(),
            self.tasks.len(),
            self.flow.len(),
        ]
    }
}

// ============================================================================
// AFFINITY MATRIX
// ============================================================================

/// Build the 4x4 non-negative affinity matrix from stream signals.
///
/// Diagonal entries are the preservation ratios scaled by signal counts plus
/// a small prior; off-diagonal entries are the fixed compatibility table.
/// With no signals at all this degenerates to a fixed default whose diagonal
/// dominates.
pub fn build_affinity_matrix(signals: &StreamSignals) -> [[f64; STREAM_COUNT]; STREAM_COUNT] {
    let counts = signals.counts();
    let mut matrix = COMPATIBILITY;
    for (i, ratio) in PRESERVATION_RATIOS.iter().enumerate() {
        matrix[i][i] = ratio * (1.0 + counts[i] as f64) + DIAGONAL_PRIOR;
    }
    matrix
}

// ============================================================================
// SINKHORN-KNOPP
// ============================================================================

/// Normalize a matrix to doubly stochastic by alternating row and column
/// scaling. The input is not mutated. Negative entries clamp to zero and
/// fully zero rows or columns are replaced with uniform values before
/// scaling.
pub fn sinkhorn_knopp(
    matrix: &[[f64; STREAM_COUNT]; STREAM_COUNT],
) -> [[f64; STREAM_COUNT]; STREAM_COUNT] {
    let mut m = *matrix;

    for row in &mut m {
        for value in row.iter_mut() {
            if *value < 0.0 {
                *value = 0.0;
            }
        }
    }

    // Degenerate rows and columns become uniform to avoid division by zero
    for row in &mut m {
        if row.iter().sum::<f64>() <= 0.0 {
            *row = [1.0 / STREAM_COUNT as f64; STREAM_COUNT];
        }
    }
    for j in 0..STREAM_COUNT {
        let column_sum: f64 = (0..STREAM_COUNT).map(|i| m[i][j]).sum();
        if column_sum <= 0.0 {
            for row in &mut m {
                row[j] = 1.0 / STREAM_COUNT as f64;
            }
        }
    }

    for _ in 0..SINKHORN_MAX_ITERATIONS {
        for row in &mut m {
            let sum: f64 = row.iter().sum();
            if sum > 0.0 {
                for value in row.iter_mut() {
                    *value /= sum;
                }
            }
        }
        for j in 0..STREAM_COUNT {
            let sum: f64 = (0..STREAM_COUNT).map(|i| m[i][j]).sum();
            if sum > 0.0 {
                for row in m.iter_mut() {
                    row[j] /= sum;
                }
            }
        }

        if max_deviation(&m) < SINKHORN_EPSILON {
            break;
        }
    }

    m
}

/// Largest deviation of any row or column sum from 1.0
fn max_deviation(m: &[[f64; STREAM_COUNT]; STREAM_COUNT]) -> f64 {
    let mut worst = 0.0_f64;
    for row in m {
        worst = worst.max((row.iter().sum::<f64>() - 1.0).abs());
    }
    for j in 0..STREAM_COUNT {
        let sum: f64 = (0..STREAM_COUNT).map(|i| m[i][j]).sum();
        worst = worst.max((sum - 1.0).abs());
    }
    worst
}

// ============================================================================
// BUDGETS
// ============================================================================

/// Integer budgets from a mixing matrix, conserving `total` exactly.
///
/// Weights are the row sums of the mixing matrix multiplied by the
/// preservation ratios; rounding remainders go to the largest fractional
/// parts (ties to the earlier stream).
pub fn compute_token_budgets(
    mixing: &[[f64; STREAM_COUNT]; STREAM_COUNT],
    total: usize,
) -> [usize; STREAM_COUNT] {
    let mut weights = [0.0_f64; STREAM_COUNT];
    for (i, row) in mixing.iter().enumerate() {
        weights[i] = row.iter().sum::<f64>() * PRESERVATION_RATIOS[i];
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        // Nothing to apportion against; give everything to identity
        let mut budgets = [0usize; STREAM_COUNT];
        budgets[0] = total;
        return budgets;
    }

    let mut budgets = [0usize; STREAM_COUNT];
    let mut fractions = [0.0_f64; STREAM_COUNT];
    let mut allocated = 0usize;
    for i in 0..STREAM_COUNT {
        let exact = total as f64 * weights[i] / weight_sum;
        budgets[i] = exact.floor() as usize;
        fractions[i] = exact - exact.floor();
        allocated += budgets[i];
    }

    let mut remainder = total - allocated;
    let mut order: Vec<usize> = (0..STREAM_COUNT).collect();
    order.sort_by(|&a, &b| {
        fractions[b]
            .partial_cmp(&fractions[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for &i in order.iter().cycle().take(STREAM_COUNT * 2) {
        if remainder == 0 {
            break;
        }
        budgets[i] += 1;
        remainder -= 1;
    }

    budgets
}

/// End-to-end allocation: affinity matrix, Sinkhorn normalization, integer
/// budgets.
pub fn allocate_budgets(signals: &StreamSignals, total: usize) -> [usize; STREAM_COUNT] {
    let affinity = build_affinity_matrix(signals);
    let mixing = sinkhorn_knopp(&affinity);
    compute_token_budgets(&mixing, total)
}

// ============================================================================
// TESTS
// ============================================================================
