//! Random generation of Jacobian chains from configured ranges.

use rand::distributions::Distribution;
use rand::distributions::Uniform;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::basic_types::Jacobian;
use crate::basic_types::JacobianChain;
use crate::bracken_assert_simple;
use crate::config::PropertyRegistry;

/// The configured ranges of the chain generator; every field has a
/// config-file key.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Chain lengths to generate.
    pub chain_lengths: Vec<usize>,
    /// Random chains per length.
    pub amount: usize,
    /// Inclusive range of the Jacobian dimensions.
    pub size_range: (usize, usize),
    /// Inclusive range of the primal DAG edge counts.
    pub dag_size_range: (usize, usize),
    /// Inclusive range of the tangent runtime factor.
    pub tangent_factor_range: (f64, f64),
    /// Inclusive range of the adjoint runtime factor.
    pub adjoint_factor_range: (f64, f64),
    /// Inclusive range of the density used for bandwidths and the
    /// non-zero count.
    pub density_range: (f64, f64),
    /// RNG seed; drawn from OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> GeneratorConfig {
        GeneratorConfig {
            chain_lengths: vec![1],
            amount: 1,
            size_range: (1, 1),
            dag_size_range: (1, 1),
            tangent_factor_range: (1.0, 1.0),
            adjoint_factor_range: (1.0, 1.0),
            density_range: (0.0, 1.0),
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn registry() -> PropertyRegistry<GeneratorConfig> {
        let mut registry = PropertyRegistry::new();

        registry.register(
            "length",
            "Lengths of the Jacobian chains.",
            |config: &mut GeneratorConfig, tokens| {
                config.chain_lengths = tokens.parse_list("length")?;
                Ok(())
            },
        );
        registry.register(
            "amount",
            "Amount of random Jacobian chains (per length).",
            |config, tokens| {
                config.amount = tokens.parse_value("amount")?;
                Ok(())
            },
        );
        registry.register(
            "size_range",
            "Range of the Jacobian dimensions.",
            |config, tokens| {
                config.size_range = tokens.parse_pair("size_range")?;
                Ok(())
            },
        );
        registry.register(
            "dag_size_range",
            "Range of the amount of edges in the DAG of a single function.",
            |config, tokens| {
                config.dag_size_range = tokens.parse_pair("dag_size_range")?;
                Ok(())
            },
        );
        registry.register(
            "tangent_factor_range",
            "Range of the tangent runtime factor.",
            |config, tokens| {
                config.tangent_factor_range = tokens.parse_pair("tangent_factor_range")?;
                Ok(())
            },
        );
        registry.register(
            "adjoint_factor_range",
            "Range of the adjoint runtime factor.",
            |config, tokens| {
                config.adjoint_factor_range = tokens.parse_pair("adjoint_factor_range")?;
                Ok(())
            },
        );
        registry.register(
            "density_range",
            "Range of density percentages of the Jacobians. Used to calculate \
             the number of non-zero entries and the bandwidths.",
            |config, tokens| {
                config.density_range = tokens.parse_pair("density_range")?;
                Ok(())
            },
        );
        registry.register(
            "seed",
            "Seed for the random number generator.",
            |config, tokens| {
                config.seed = Some(tokens.parse_value("seed")?);
                Ok(())
            },
        );

        registry
    }
}

/// Generates random Jacobian chains, `amount` chains per configured
/// length, with contiguous dimensions (`n_k = m_{k-1}`).
#[derive(Debug)]
pub struct JacobianChainGenerator {
    config: GeneratorConfig,
    rng: SmallRng,
    size_distribution: Uniform<usize>,
    dag_size_distribution: Uniform<usize>,
    tangent_factor_distribution: Uniform<f64>,
    adjoint_factor_distribution: Uniform<f64>,
    density_distribution: Uniform<f64>,
    batch_idx: usize,
    length_idx: usize,
}

impl JacobianChainGenerator {
    pub fn new(config: GeneratorConfig) -> JacobianChainGenerator {
        bracken_assert_simple!(config.size_range.0 >= 1, "Jacobian dimensions start at 1");
        bracken_assert_simple!(config.size_range.0 <= config.size_range.1);
        bracken_assert_simple!(config.dag_size_range.0 <= config.dag_size_range.1);
        bracken_assert_simple!(config.chain_lengths.iter().all(|&length| length >= 1));

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let size_distribution = Uniform::new_inclusive(config.size_range.0, config.size_range.1);
        let dag_size_distribution =
            Uniform::new_inclusive(config.dag_size_range.0, config.dag_size_range.1);
        let tangent_factor_distribution = Uniform::new_inclusive(
            config.tangent_factor_range.0,
            config.tangent_factor_range.1,
        );
        let adjoint_factor_distribution = Uniform::new_inclusive(
            config.adjoint_factor_range.0,
            config.adjoint_factor_range.1,
        );
        let density_distribution =
            Uniform::new_inclusive(config.density_range.0, config.density_range.1);

        JacobianChainGenerator {
            config,
            rng,
            size_distribution,
            dag_size_distribution,
            tangent_factor_distribution,
            adjoint_factor_distribution,
            density_distribution,
            batch_idx: 0,
            length_idx: 0,
        }
    }

    fn random_jacobian(&mut self, n: Option<usize>) -> Jacobian {
        let mut jac = Jacobian {
            n: n.unwrap_or_else(|| self.size_distribution.sample(&mut self.rng)),
            m: self.size_distribution.sample(&mut self.rng),
            ..Jacobian::default()
        };

        jac.kl = ((jac.m - 1) as f64 * self.density_distribution.sample(&mut self.rng)).round()
            as usize;
        jac.ku = ((jac.n - 1) as f64 * self.density_distribution.sample(&mut self.rng)).round()
            as usize;

        let max_mn = jac.m.max(jac.n);
        jac.non_zero_elements = max_mn
            + ((jac.m * jac.n - max_mn) as f64 * self.density_distribution.sample(&mut self.rng))
                .round() as usize;

        jac.edges_in_dag = self.dag_size_distribution.sample(&mut self.rng);
        jac.tangent_factor = self.tangent_factor_distribution.sample(&mut self.rng);
        jac.adjoint_factor = self.adjoint_factor_distribution.sample(&mut self.rng);
        jac.derive_sweep_costs();

        jac
    }
}

impl Iterator for JacobianChainGenerator {
    type Item = JacobianChain;

    fn next(&mut self) -> Option<JacobianChain> {
        let length = *self.config.chain_lengths.get(self.length_idx)?;

        let mut elementals = Vec::with_capacity(length);
        elementals.push(self.random_jacobian(None));
        elementals[0].i = 0;
        elementals[0].j = 1;

        for k in 1..length {
            let n = elementals[k - 1].m;
            let mut jac = self.random_jacobian(Some(n));
            jac.i = k;
            jac.j = k + 1;
            elementals.push(jac);
        }

        let chain = JacobianChain::new(elementals, self.batch_idx);

        self.batch_idx += 1;
        if self.batch_idx >= self.config.amount {
            self.batch_idx = 0;
            self.length_idx += 1;
        }

        Some(chain)
    }
}
