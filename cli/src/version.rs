use clap::Parser;

/// Print the version of this binary.
#[derive(Debug, Parser)]
pub(crate) struct Version {}

impl Version {
    pub(crate) fn run(self) {
        println!("{}", line());
    }
}

fn line() -> String {
    format!("xstrapolate version {}", env!("CARGO_PKG_VERSION"))
}

#[test]
fn names_the_package_version() {
    assert_eq!(line(), "xstrapolate version 0.1.0");
}
