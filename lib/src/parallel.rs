//! Chunked evaluation of energy vectors on scoped threads.
//!
//! Every output entry is computed by the same closure regardless of which
//! worker owns its chunk, so the result doesn't depend on the thread count.

// Below this many entries per worker, spawning costs more than it saves
const MIN_ENTRIES_PER_WORKER: usize = 256;

/// Sets `out[i] = f(i)` for every entry, using up to `max_workers` threads
pub(crate) fn fill<F>(out: &mut [f32], max_workers: usize, f: F)
where
    F: Fn(usize) -> f32 + Sync,
{
    let workers = max_workers.min(out.len() / MIN_ENTRIES_PER_WORKER).max(1);

    if workers == 1 {
        fill_serial(out, 0, &f);
        return;
    }

    // for WASM we do not have threads and crossbeam panics, so let's just
    // fill serially
    #[cfg(target_arch = "wasm32")]
    fill_serial(out, 0, &f);

    #[cfg(not(target_arch = "wasm32"))]
    {
        let chunk_len = (out.len() + workers - 1) / workers;
        let f = &f;

        let res = crossbeam_utils::thread::scope(|scope| {
            for (i, chunk) in out.chunks_mut(chunk_len).enumerate() {
                scope.spawn(move |_| fill_serial(chunk, i * chunk_len, f));
            }
        });

        if let Err(panic) = res {
            std::panic::resume_unwind(panic);
        }
    }
}

#[inline]
fn fill_serial<F>(out: &mut [f32], offset: usize, f: &F)
where
    F: Fn(usize) -> f32,
{
    for (i, v) in out.iter_mut().enumerate() {
        *v = f(offset + i);
    }
}
