//! Configuration round-trip through a JSON file, as the CLI loads it.

use std::io::Write;

use oocore::arch::demo::asm;
use oocore::config::Config;

use crate::common::TestContextBuilder;

#[test]
fn test_json_config_file_drives_the_machine() {
    let json = r#"{
        "Pipeline-Widths": { "FrontEnd": 1, "Commit": 1, "Dispatch-Rate": 1 },
        "Queue-Sizes": { "ROB": 8, "Load": 2, "Store": 2 },
        "Fetch": { "Fetch-Block-Size": 8 }
    }"#;
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(json.as_bytes()).expect("write config");

    let text = std::fs::read_to_string(file.path()).expect("read config");
    let config: Config = serde_json::from_str(&text).expect("parse config");
    assert!(config.validate().is_ok());
    assert_eq!(config.pipeline_widths.front_end, 1);
    assert_eq!(config.queue_sizes.rob, 8);

    // The narrow machine still runs a program to completion.
    let program = [asm::addi(1, 0, 3), asm::add(2, 1, 1), asm::sys(0)];
    let mut ctx = TestContextBuilder::new(&program).config(config).build();
    assert!(ctx.run_to_halt(300));
    assert_eq!(ctx.reg(1), 3);
    assert_eq!(ctx.reg(2), 6);
}
