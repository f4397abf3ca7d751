use std::time::Duration;

use serde::Deserialize;

use crate::user::TaskWeights;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub target: String,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub users: usize,

    #[serde(default)]
    pub wait: Wait,
    #[serde(default = "default_manager_ratio")]
    pub manager_ratio: f64,
    #[serde(default)]
    pub weights: TaskWeights,
}

#[derive(Debug, Deserialize)]
pub struct Wait {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for Wait {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

fn default_manager_ratio() -> f64 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let yaml = "
target: http://localhost:8000
duration: 2m
scenarios:
  - name: mixed
    users: 50
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.target, "http://localhost:8000");
        assert_eq!(config.duration, Duration::from_secs(120));

        let scenario = &config.scenarios[0];
        assert_eq!(scenario.users, 50);
        assert_eq!(scenario.wait.min, Duration::from_secs(1));
        assert_eq!(scenario.wait.max, Duration::from_secs(5));
        assert_eq!(scenario.manager_ratio, 0.2);
        assert_eq!(scenario.weights, TaskWeights::default());
    }

    #[test]
    fn partial_weights_fall_back_to_defaults() {
        let yaml = "
target: http://localhost:8000
duration: 30s
scenarios:
  - name: managers
    users: 5
    manager_ratio: 1.0
    wait:
      min: 500ms
      max: 2s
    weights:
      register_student: 5
      create_teacher: 5
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        let scenario = &config.scenarios[0];
        assert_eq!(scenario.manager_ratio, 1.0);
        assert_eq!(scenario.wait.min, Duration::from_millis(500));
        assert_eq!(scenario.weights.register_student, 5);
        assert_eq!(scenario.weights.create_teacher, 5);
        // unspecified weights keep the default traffic mix
        assert_eq!(scenario.weights.homepage, TaskWeights::default().homepage);
    }
}
