/// Generates one test function per .sd script in tests/fixtures/.
/// Each test runs the shared parse property checks on its fixture.
fn main() {
    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest = std::path::Path::new(&out_dir).join("fixture_tests.rs");

    let mut code = String::from(
        r#"mod fixtures {
    use super::check_fixture;
"#,
    );

    let mut entries: Vec<_> = std::fs::read_dir("tests/fixtures")
        .expect("tests/fixtures exists")
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "sd") {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let ident = name.replace('-', "_");
            code.push_str(&format!(
                r#"
    #[test]
    fn {ident}() {{
        check_fixture("{name}");
    }}
"#
            ));
        }
    }

    code.push_str("}\n");
    std::fs::write(&dest, code).expect("write generated fixture tests");

    println!("cargo::rerun-if-changed=tests/fixtures");
}
