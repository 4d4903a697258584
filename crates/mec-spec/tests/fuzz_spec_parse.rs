use mec_core::EchoTimes;
use mec_spec::{parse_dataset_spec, parse_name};
use proptest::prelude::*;

fn echo_times(n: usize) -> EchoTimes {
    let times: Vec<f64> = (0..n).map(|i| 12.0 + 25.0 * i as f64).collect();
    EchoTimes::new(times).expect("echo times")
}

proptest! {
    #[test]
    fn parsed_names_roundtrip(
        base in "[a-zA-Z_][a-zA-Z0-9_.]{0,12}",
        ext in prop::sample::select(vec!["", ".nii", ".nii.gz", ".1D"]),
    ) {
        prop_assume!(!base.contains('+'));
        let fname = format!("{base}{ext}");
        let parsed = parse_name(&fname);
        prop_assert_eq!(parsed.original(), fname);
    }

    #[test]
    fn shorthand_and_longhand_agree_on_run_name(
        prefix in "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
        n in 1usize..5,
    ) {
        let tes = echo_times(n);
        let markers: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
        let short = format!("{prefix}[{}].nii.gz", markers.join(","));
        let long = markers
            .iter()
            .map(|m| format!("{prefix}{m}.nii.gz"))
            .collect::<Vec<_>>()
            .join(",");

        let short_spec = parse_dataset_spec(&short).expect("shorthand");
        let long_spec = parse_dataset_spec(&long).expect("longhand");
        prop_assert_eq!(
            short_spec.run_name(&tes).expect("short run"),
            long_spec.run_name(&tes).expect("long run")
        );
        for echo in 0..n {
            prop_assert_eq!(
                short_spec.resolve(&tes, echo).expect("short path"),
                long_spec.resolve(&tes, echo).expect("long path")
            );
        }
    }

    #[test]
    fn longhand_count_mismatch_always_errors(
        prefix in "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
        listed in 1usize..5,
        configured in 1usize..5,
    ) {
        prop_assume!(listed != configured);
        let long = (1..=listed)
            .map(|m| format!("{prefix}{m}.nii"))
            .collect::<Vec<_>>()
            .join(",");
        let spec = parse_dataset_spec(&long).expect("longhand");
        let err = spec.run_name(&echo_times(configured)).expect_err("mismatch");
        prop_assert_eq!(err.info().code.as_str(), "echo_count_mismatch");
    }
}
