/// Given the module path and name of a test function, returns the name as it is
/// used by cargo test.
///
/// # Examples
/// ```ignore
/// assert_eq!(make_full_test_name("mycrate", "my_test"), "my_test");
/// assert_eq!(make_full_test_name("mycrate::foo", "my_test"), "foo::my_test");
/// ```
pub(crate) fn make_full_test_name(module_path: &str, test_name: &str) -> String {
    match module_path.split_once("::") {
        // Not in the root module, remove the crate name
        Some((_, inner)) => format!("{inner}::{test_name}"),
        None => test_name.to_string(),
    }
}

/// Re-runs the test `test_full_name` under `mpirun` with `processes` ranks and
/// fails if any rank fails.
pub(crate) fn run_mpi_test(test_full_name: &str, processes: usize) {
    let status = std::process::Command::new("mpirun")
        .arg("-n")
        .arg(processes.to_string())
        .arg("--allow-run-as-root")
        .arg("cargo")
        .arg("test")
        .arg("--lib")
        .arg(test_full_name)
        .arg("--")
        .arg("--ignored")
        .arg("--exact")
        .status()
        .expect("failed to execute mpirun");
    assert!(status.success(), "{test_full_name} failed under mpirun");
}

/// Declares a test that runs its body on `$processes` MPI ranks. The outer
/// test launches `mpirun`, which executes the ignored `<name>_internal` test
/// on every rank.
#[macro_export]
macro_rules! mpi_test {
    ($processes:expr, fn $name:ident $_:tt $body:block) => {
        paste::paste! {
            #[test]
            fn $name() {
                let full_path = module_path!();
                let test_name = concat!(stringify!($name), "_internal");
                let exact_name = $crate::mpi::testing::make_full_test_name(full_path, test_name);
                $crate::mpi::testing::run_mpi_test(&exact_name, $processes);
            }

            #[test]
            #[ignore]
            fn [<$name _internal>]() $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::make_full_test_name;

    #[test]
    fn test_make_test_name() {
        assert_eq!(make_full_test_name("mycrate", "my_test"), "my_test");
        assert_eq!(
            make_full_test_name("mycrate::foo", "my_test"),
            "foo::my_test"
        );
        assert_eq!(
            make_full_test_name("a2a_contract::mpi::communication::tests", "my_test"),
            "mpi::communication::tests::my_test"
        );
    }
}
