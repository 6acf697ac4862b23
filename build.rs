//! Build script for storalloc.
//!
//! Provides build-time diagnostics, feature detection, and helpful messages
//! for users integrating storalloc into their projects.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_GPU_VULKAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");

    // Collect enabled features
    let vulkan_enabled = env::var("CARGO_FEATURE_GPU_VULKAN").is_ok();
    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();

    // Get build profile
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific diagnostics
    // =========================================================================

    // --- Vulkan Backend ---
    if vulkan_enabled {
        emit_info("Vulkan backend enabled");
        emit_note("VulkanBackend puts every storage in HOST_VISIBLE memory so");
        emit_note("map ranges can be handed to the CPU. Construct it with:");
        emit_note("  let backend = VulkanBackend::new(device, &instance, physical_device);");
        emit_note("  let alloc = StorageAllocator::new(backend);");
    }

    // --- Debug Features ---
    if debug_enabled {
        emit_info("Debug features enabled");
        emit_note("Debug mode provides:");
        emit_note("  • Window poisoning (invalidated map ranges filled with 0xAB)");
        emit_note("  • Extended validation checks");

        if is_release {
            emit_warning("Debug features enabled in release build!");
            emit_note("This may impact performance. Consider disabling for production.");
        }
    } else if !is_release {
        emit_note("Tip: Enable 'debug' feature to poison invalidated map windows:");
        emit_note("  storalloc = { version = \"0.3\", features = [\"debug\"] }");
    }

    // --- Logging ---
    if log_enabled {
        emit_info("Logging enabled (target \"storalloc\")");
        emit_note("Map/unmap cycles log at debug, refused reservations at warn.");
    }

    // =========================================================================
    // Common usage reminders
    // =========================================================================

    emit_separator();
    emit_info("storalloc Quick Reference");
    emit_separator();
    emit_note("Map cycle (bulk reclaim, no per-reservation free):");
    emit_note("  let map = alloc.map(storage, 0, size, MapFlags::WRITE)?;");
    emit_note("  let mut range = alloc.alloc(map, bytes)?;");
    emit_note("  alloc.write(&mut range, data)?;");
    emit_note("  alloc.unmap(storage)?;  // flushes, kills all handles");
    emit_note("");
    emit_note("Frame streaming (vertex / index / entity-id streams):");
    emit_note("  streams.begin_frame()?;");
    emit_note("  let span = streams.push(StreamKind::Vertex, &verts)?;");
    emit_note("  streams.end_frame()?;");
    emit_separator();

    // =========================================================================
    // Environment checks
    // =========================================================================

    check_target_features(vulkan_enabled);
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[storalloc] ℹ️  {}", msg);
}

fn emit_note(msg: &str) {
    if msg.is_empty() {
        println!("cargo:warning=[storalloc]");
    } else {
        println!("cargo:warning=[storalloc]    {}", msg);
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[storalloc] ⚠️  {}", msg);
}

fn emit_separator() {
    println!("cargo:warning=[storalloc] ────────────────────────────────────────");
}

// =============================================================================
// Environment and toolchain checks
// =============================================================================

fn check_target_features(vulkan_enabled: bool) {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("x86_64") {
        if env::var("CARGO_CFG_TARGET_FEATURE").map(|f| f.contains("avx2")).unwrap_or(false) {
            emit_info("AVX2 available - mapped writes may be vectorized");
        }
    }

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("storalloc works on WASM with the dummy backend, but:");
        emit_note("  • The Vulkan backend is unavailable");
        emit_note("  • Memory budget may be constrained");
        if vulkan_enabled {
            emit_warning("'gpu-vulkan' feature enabled for a WASM target!");
        }
    }

    if target.contains("windows") {
        emit_info("Building for Windows");
    } else if target.contains("linux") {
        emit_info("Building for Linux");
    } else if target.contains("darwin") || target.contains("macos") {
        emit_info("Building for macOS");
    }
}
