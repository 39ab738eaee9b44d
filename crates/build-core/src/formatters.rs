use std::collections::BTreeMap;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "poddle";
pub const BUILD_REQUEST_LABEL: &str = "poddle.io/build-request";

const JOB_NAME_PREFIX: &str = "build-";
// Job names end up in the `job-name` pod label, so they share the label limit
const MAX_JOB_NAME_LEN: usize = 63;
const HASH_SUFFIX_LEN: usize = 10;

/// generate job name like `build-{build_name}`.
/// Names over the limit are cut and suffixed with a sha256 prefix of the full build name.
pub fn format_job_name(build_name: &str) -> String {
    let name = format!("{JOB_NAME_PREFIX}{build_name}");
    if name.len() <= MAX_JOB_NAME_LEN {
        return name;
    }

    let digest = sha256::digest(build_name);
    let keep = MAX_JOB_NAME_LEN - HASH_SUFFIX_LEN - 1;
    let head = name[..keep].trim_end_matches(['-', '.']);

    format!("{}-{}", head, &digest[..HASH_SUFFIX_LEN])
}

/// Label values are capped at 63 characters as well, so the job name rules apply
pub fn format_labels(build_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    let job_name = format_job_name(build_name);
    let value = job_name.strip_prefix(JOB_NAME_PREFIX).unwrap_or(&job_name);
    labels.insert(BUILD_REQUEST_LABEL.to_string(), value.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_keep_prefix_form() {
        assert_eq!(format_job_name("app"), "build-app");
    }

    #[test]
    fn test_long_names_are_bounded_and_distinct() {
        let a = format!("{}-a", "x".repeat(70));
        let b = format!("{}-b", "x".repeat(70));

        let job_a = format_job_name(&a);
        let job_b = format_job_name(&b);

        assert!(job_a.len() <= MAX_JOB_NAME_LEN);
        assert!(job_b.len() <= MAX_JOB_NAME_LEN);
        assert!(job_a.starts_with("build-xxx"));
        assert_ne!(job_a, job_b);
        assert_eq!(job_a, format_job_name(&a));
    }

    #[test]
    fn test_labels_fit_label_limit() {
        let labels = format_labels(&"y".repeat(200));
        assert!(labels[BUILD_REQUEST_LABEL].len() <= MAX_JOB_NAME_LEN);
        assert_eq!(labels[MANAGED_BY_LABEL], "poddle");

        let labels = format_labels("build-app");
        assert_eq!(labels[BUILD_REQUEST_LABEL], "build-app");
    }
}
