use sparla_core::blas;
use sparla_lsolver::{
    algorithms::cpu_bicgstab::bicgstab, BiCGStab, ConversionPolicy, CooMatrix, CpuDevice,
    CsrMatrix, Format, GpuDevice, Identity, LinearOperator, RelativeResidual, SolveAlgorithm,
    SolveStatus, SparseMatrixAny,
};

use pollster::block_on;

fn assert_approx_eq_vec(a: &[f64], b: &[f64], tolerance: f64) {
    assert_eq!(a.len(), b.len(), "vector lengths differ");
    for i in 0..a.len() {
        let diff = (a[i] - b[i]).abs();
        assert!(
            diff <= tolerance,
            "mismatch at index {}: expected {}, got {}, diff {}",
            i,
            b[i],
            a[i],
            diff
        );
    }
}

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
        .expect("laplacian construction")
}

fn relative_residual<M: LinearOperator<Value = f64>>(a: &M, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    a.spmv(x, &mut ax).unwrap();
    let mut r = vec![0.0; b.len()];
    blas::axpby(1.0, b, -1.0, &ax, &mut r).unwrap();
    blas::nrm2(&r) / blas::nrm2(b)
}

#[test]
fn test_identity_converges_in_one_iteration() {
    let a = CsrMatrix::from_dense(&[
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ]);
    let b = vec![1.0, 2.0, 3.0];
    let result = block_on(BiCGStab::default().solve(&CpuDevice::default(), &a, &b)).unwrap();
    assert_eq!(result.metadata.status, SolveStatus::Converged);
    assert_eq!(result.metadata.iterations, 1);
    assert_approx_eq_vec(&result.x, &b, 1e-12);
}

#[test]
fn test_laplacian_converges_under_200_iterations() {
    let a = laplacian_2d(64);
    let b = vec![1.0; a.num_rows()];
    let algorithm = BiCGStab::with_params(1e-6, 200, false);
    let result = block_on(algorithm.solve(&CpuDevice::default(), &a, &b)).unwrap();
    assert_eq!(result.metadata.status, SolveStatus::Converged);
    assert!(result.metadata.iterations < 200);
    assert!(relative_residual(&a, &result.x, &b) < 1e-6);
}

#[test]
fn test_jacobi_preconditioning_converges() {
    let a = laplacian_2d(32);
    let b = vec![1.0; a.num_rows()];
    let algorithm = BiCGStab::with_params(1e-8, 400, true);
    let result = block_on(algorithm.solve(&CpuDevice::default(), &a, &b)).unwrap();
    assert_eq!(result.metadata.status, SolveStatus::Converged);
    assert!(relative_residual(&a, &result.x, &b) < 1e-8);
}

#[test]
fn test_scaling_invariance() {
    let a = laplacian_2d(16);
    let b: Vec<f64> = (0..a.num_rows()).map(|i| ((i % 7) as f64) - 3.0).collect();
    let c = 37.5;

    let mut scaled = a.clone();
    for v in scaled.values_mut() {
        *v *= c;
    }
    let scaled_b: Vec<f64> = b.iter().map(|&v| v * c).collect();

    let algorithm = BiCGStab::with_params(1e-10, 1000, false);
    let plain = block_on(algorithm.solve(&CpuDevice::default(), &a, &b)).unwrap();
    let rescaled = block_on(algorithm.solve(&CpuDevice::default(), &scaled, &scaled_b)).unwrap();
    assert!(plain.metadata.status.is_converged());
    assert!(rescaled.metadata.status.is_converged());
    assert_approx_eq_vec(&plain.x, &rescaled.x, 1e-6);
}

#[test]
fn test_solver_agrees_across_formats() {
    let a = laplacian_2d(8);
    let b: Vec<f64> = (0..a.num_rows()).map(|i| (i as f64).sin()).collect();
    let any = SparseMatrixAny::Csr(a);
    let policy = ConversionPolicy::default();

    let algorithm = BiCGStab::with_params(1e-10, 1000, false);
    let reference = block_on(algorithm.solve(
        &CpuDevice::default(),
        &any.convert_to(Format::Csr, &policy).unwrap(),
        &b,
    ))
    .unwrap();
    for &format in &Format::ALL {
        let m = any.convert_to(format, &policy).unwrap();
        let result = block_on(algorithm.solve(&CpuDevice::default(), &m, &b)).unwrap();
        assert!(result.metadata.status.is_converged(), "format {}", format);
        assert_approx_eq_vec(&result.x, &reference.x, 1e-6);
    }
}

#[test]
fn test_iteration_limit_is_reported_not_an_error() {
    let a = laplacian_2d(16);
    let b = vec![1.0; a.num_rows()];
    let algorithm = BiCGStab::with_params(1e-14, 2, false);
    let result = block_on(algorithm.solve(&CpuDevice::default(), &a, &b)).unwrap();
    assert_eq!(result.metadata.status, SolveStatus::IterationLimit);
    assert_eq!(result.metadata.iterations, 2);
}

#[test]
fn test_initial_guess_is_respected() {
    // Solving from the exact solution returns immediately.
    let a = laplacian_2d(4);
    let b = vec![2.0; a.num_rows()];
    let mut x = vec![0.0; a.num_rows()];
    let mut criteria = RelativeResidual::new(1e-10, 100);
    let first = bicgstab(&a, &mut x, &b, &mut criteria, &Identity, false).unwrap();
    assert!(first.status.is_converged());

    let mut criteria = RelativeResidual::new(1e-10, 100);
    let again = bicgstab(&a, &mut x, &b, &mut criteria, &Identity, false).unwrap();
    assert!(again.status.is_converged());
    assert_eq!(again.iterations, 0);
}

#[test]
fn test_gpu_runtime_end_to_end() {
    block_on(async {
        let device = match GpuDevice::new().await {
            Ok(device) => device,
            Err(e) => {
                eprintln!("skipping GPU test, no usable adapter: {}", e);
                return;
            }
        };

        // [10  0 20]
        // [ 0  0  0]
        // [ 0  0 30]
        // [40 50 60]
        let coo = CooMatrix::from_triplets(
            4,
            3,
            vec![
                (0, 0, 10.0),
                (0, 2, 20.0),
                (2, 2, 30.0),
                (3, 0, 40.0),
                (3, 1, 50.0),
                (3, 2, 60.0),
            ],
        )
        .unwrap();
        let policy = ConversionPolicy::default();
        let csr = coo.to_csr().unwrap();
        let dia = csr.to_dia(&policy).unwrap();
        let ell = csr.to_ell(&policy).unwrap();
        let hyb = csr.to_hyb(&policy).unwrap();

        let x = device.create_vector("x", &[1.0, 1.0, 1.0]).unwrap();
        let expected = [30.0, 0.0, 30.0, 150.0];

        let mut y = device.create_empty_vector("y", 4).unwrap();
        let coo_gpu = device.create_coo_matrix(&coo).unwrap();
        coo_gpu.spmv(&x, &mut y).await.unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);

        let csr_gpu = device.create_csr_matrix(&csr).unwrap();
        csr_gpu.spmv(&x, &mut y).await.unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);
        csr_gpu
            .spmv_with(&x, &mut y, sparla_core::CsrKernel::Vector)
            .await
            .unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);

        let dia_gpu = device.create_dia_matrix(&dia).unwrap();
        dia_gpu.spmv(&x, &mut y).await.unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);

        let ell_gpu = device.create_ell_matrix(&ell).unwrap();
        ell_gpu.spmv(&x, &mut y).await.unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);

        let hyb_gpu = device.create_hyb_matrix(&hyb).unwrap();
        hyb_gpu.spmv(&x, &mut y).await.unwrap();
        assert_approx_eq_vec(&y.read_contents().await.unwrap(), &expected, 1e-12);

        // Cross-space round trip.
        assert_eq!(csr_gpu.download().await.unwrap(), csr);
        assert_eq!(ell_gpu.download().await.unwrap(), ell);

        // Solve a small SPD system on the device.
        let a = CsrMatrix::from_dense(&[
            vec![4.0, -1.0, 0.0],
            vec![-1.0, 4.0, -1.0],
            vec![0.0, -1.0, 4.0],
        ]);
        let a_gpu = device.create_csr_matrix(&a).unwrap();
        let b = vec![1.0, 2.0, 3.0];
        let algorithm = BiCGStab::with_params(1e-8, 100, true);
        let result = algorithm.solve(&device, &a_gpu, &b).await.unwrap();
        assert!(result.metadata.status.is_converged());
        assert!(relative_residual(&a, &result.x, &b) < 1e-6);
    });
}
