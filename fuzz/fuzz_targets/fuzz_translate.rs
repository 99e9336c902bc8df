#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Translation should reject malformed binaries, never panic on them.
    if let Ok(module) = kiln_spirv::parse_bytes(data) {
        let _ = kiln_ir::validate(&module);
        let _ = kiln_ir::dump_module(&module);
    }
});
