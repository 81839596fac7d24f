use std::time::Instant;

use sparla_lsolver::{
    BiCGStab, CooMatrix, CsrMatrix, GpuDevice, SolveAlgorithm, TransferStats,
};

/// 2D five-point Laplacian on an m x m grid.
fn laplacian_2d(m: usize) -> CsrMatrix<f64> {
    let n = m * m;
    let mut triplets = Vec::with_capacity(5 * n);
    for row in 0..m {
        for col in 0..m {
            let i = row * m + col;
            triplets.push((i, i, 4.0));
            if row > 0 {
                triplets.push((i, i - m, -1.0));
            }
            if row + 1 < m {
                triplets.push((i, i + m, -1.0));
            }
            if col > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if col + 1 < m {
                triplets.push((i, i + 1, -1.0));
            }
        }
    }
    CooMatrix::from_triplets(n, n, triplets)
        .and_then(|coo| coo.to_csr())
        .expect("failed to build the Laplacian")
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .init();

    let m = 64;
    let a = laplacian_2d(m);
    let n = a.num_rows();
    let b = vec![1.0; n];
    log::info!(
        "Solving the {}x{} five-point Laplacian ({} unknowns, {} nonzeros)",
        m,
        m,
        n,
        a.num_entries()
    );

    let device = GpuDevice::new().await.expect("failed to create GPU device");
    let a_gpu = device
        .create_csr_matrix(&a)
        .expect("failed to upload matrix");

    let algorithm = BiCGStab::with_params(1e-6, 5 * n, true).verbose(true);

    device.reset_transfer_stats();
    let start = Instant::now();
    let result = algorithm.solve(&device, &a_gpu, &b).await;
    let elapsed = start.elapsed();

    let TransferStats {
        bytes_to_gpu,
        bytes_from_gpu,
    } = device.get_transfer_stats();
    log::info!("GPU transfer stats:");
    log::info!("  bytes host -> device: {}", bytes_to_gpu);
    log::info!("  bytes device -> host: {}", bytes_from_gpu);

    match result {
        Ok(result) => {
            log::info!("Solver finished: {:?}", result.metadata.status);
            log::info!("  iterations: {}", result.metadata.iterations);
            log::info!("  residual norm: {:.6e}", result.metadata.residual_norm);
            log::info!("  time elapsed: {:?}", elapsed);
        }
        Err(e) => {
            log::error!("Solver failed: {:?}", e);
        }
    }
}
