// SPDX-License-Identifier: Apache-2.0

// mimalloc: faster small allocations than the system allocator for a workload
// dominated by short-lived Strings, row vectors and serde values.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let code = datawarden_lib::run().await;
    // The blocking stdin reader would otherwise keep the runtime alive
    std::process::exit(code);
}
