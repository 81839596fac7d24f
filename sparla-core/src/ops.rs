//! Internal GPU compute operations.
//!
//! Each operation compiles its WGSL shader, binds the operand buffers in
//! declaration order and dispatches one pass. The bind-group plumbing that
//! every launch repeats is factored into [`run_compute`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::context::GpuContext;
use crate::error::{Result, SparlaCoreError};
use crate::gpu_matrix::{CooMatrixGpu, CsrMatrixGpu, DiaMatrixGpu, EllMatrixGpu};
use crate::vector::GpuVector;

const ELEMENTWISE_WORKGROUP: u32 = 256;
const ROW_WORKGROUP: u32 = 64;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SizeParams {
    size: u32,
    pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpmvParams {
    rows: u32,
    cols: u32,
    nnz: u32,
    flag: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SlottedParams {
    rows: u32,
    cols: u32,
    lanes: u32,
    stride: u32,
}

pub(crate) enum Binding<'a> {
    Uniform(&'a wgpu::Buffer),
    ReadOnly(&'a wgpu::Buffer),
    ReadWrite(&'a wgpu::Buffer),
}

/// Compiles `shader`, binds `bindings` in order and dispatches
/// `workgroups` along x.
fn run_compute(
    context: &GpuContext,
    label: &str,
    shader: &'static str,
    entry_point: &str,
    bindings: &[Binding<'_>],
    workgroups: u32,
) {
    let device = &context.device;

    let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader.into()),
    });

    let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| wgpu::BindGroupLayoutEntry {
            binding: i as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: match binding {
                    Binding::Uniform(_) => wgpu::BufferBindingType::Uniform,
                    Binding::ReadOnly(_) => wgpu::BufferBindingType::Storage { read_only: true },
                    Binding::ReadWrite(_) => wgpu::BufferBindingType::Storage { read_only: false },
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &layout_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader_module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    let group_entries: Vec<wgpu::BindGroupEntry> = bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| wgpu::BindGroupEntry {
            binding: i as u32,
            resource: match binding {
                Binding::Uniform(b) | Binding::ReadOnly(b) | Binding::ReadWrite(b) => {
                    b.as_entire_binding()
                }
            },
        })
        .collect();
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &bind_group_layout,
        entries: &group_entries,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(label),
    });
    {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
    }
    context.queue.submit(std::iter::once(encoder.finish()));
}

fn workgroups_for(size: u32, workgroup_size: u32) -> u32 {
    size.div_ceil(workgroup_size).max(1)
}

fn ensure_resident(context: &Arc<GpuContext>, vectors: &[&GpuVector]) -> Result<()> {
    for v in vectors {
        if !Arc::ptr_eq(context, &v.context) {
            return Err(SparlaCoreError::MemorySpaceMismatch(format!(
                "vector '{}' belongs to a different device",
                v.label()
            )));
        }
    }
    Ok(())
}

fn ensure_same_size(op: &str, a: &GpuVector, b: &GpuVector) -> Result<()> {
    if a.size() != b.size() {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "vector sizes for {} mismatch: {} != {}",
            op,
            a.size(),
            b.size()
        )));
    }
    Ok(())
}

fn size_params(context: &GpuContext, label: &str, size: u32) -> wgpu::Buffer {
    context.create_gpu_buffer_with_data(
        label,
        bytemuck::bytes_of(&SizeParams { size, pad: [0; 3] }),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    )
}

fn coef_buffer(context: &GpuContext, label: &str, coefs: &[f64]) -> wgpu::Buffer {
    context.create_gpu_buffer_with_data(
        label,
        bytemuck::cast_slice(coefs),
        wgpu::BufferUsages::STORAGE,
    )
}

/// `v[i] = value` for all elements.
pub(crate) fn fill(context: &Arc<GpuContext>, v: &mut GpuVector, value: f64) -> Result<()> {
    ensure_resident(context, &[&*v])?;
    let size = v.size() as u32;
    let params = size_params(context, "fill params", size);
    let coefs = coef_buffer(context, "fill coefs", &[value]);
    run_compute(
        context,
        "fill",
        include_str!("shaders/fill.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(&coefs),
            Binding::ReadWrite(v.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// `y = alpha * x + y`.
pub(crate) fn axpy(
    context: &Arc<GpuContext>,
    alpha: f64,
    x: &GpuVector,
    y: &mut GpuVector,
) -> Result<()> {
    ensure_resident(context, &[x, &*y])?;
    ensure_same_size("axpy", x, y)?;
    let size = x.size() as u32;
    let params = size_params(context, "axpy params", size);
    let coefs = coef_buffer(context, "axpy coefs", &[alpha]);
    run_compute(
        context,
        "axpy",
        include_str!("shaders/axpy.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(&coefs),
            Binding::ReadOnly(x.inner()),
            Binding::ReadWrite(y.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// `out = alpha * x + beta * y`. `out` must be distinct from both inputs.
pub(crate) fn axpby(
    context: &Arc<GpuContext>,
    alpha: f64,
    x: &GpuVector,
    beta: f64,
    y: &GpuVector,
    out: &mut GpuVector,
) -> Result<()> {
    ensure_resident(context, &[x, y, &*out])?;
    ensure_same_size("axpby", x, y)?;
    ensure_same_size("axpby", x, out)?;
    let size = x.size() as u32;
    let params = size_params(context, "axpby params", size);
    let coefs = coef_buffer(context, "axpby coefs", &[alpha, beta]);
    run_compute(
        context,
        "axpby",
        include_str!("shaders/axpby.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(&coefs),
            Binding::ReadOnly(x.inner()),
            Binding::ReadOnly(y.inner()),
            Binding::ReadWrite(out.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// `out = a * out + b * y + c * z`, in place on `out`.
pub(crate) fn axpbypcz(
    context: &Arc<GpuContext>,
    a: f64,
    out: &mut GpuVector,
    b: f64,
    y: &GpuVector,
    c: f64,
    z: &GpuVector,
) -> Result<()> {
    ensure_resident(context, &[&*out, y, z])?;
    ensure_same_size("axpbypcz", y, out)?;
    ensure_same_size("axpbypcz", z, out)?;
    let size = out.size() as u32;
    let params = size_params(context, "axpbypcz params", size);
    let coefs = coef_buffer(context, "axpbypcz coefs", &[a, b, c]);
    run_compute(
        context,
        "axpbypcz",
        include_str!("shaders/axpbypcz.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(&coefs),
            Binding::ReadOnly(y.inner()),
            Binding::ReadOnly(z.inner()),
            Binding::ReadWrite(out.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// `out = x * y` elementwise.
pub(crate) fn elementwise_mul(
    context: &Arc<GpuContext>,
    x: &GpuVector,
    y: &GpuVector,
    out: &mut GpuVector,
) -> Result<()> {
    ensure_resident(context, &[x, y, &*out])?;
    ensure_same_size("elementwise_mul", x, y)?;
    ensure_same_size("elementwise_mul", x, out)?;
    let size = x.size() as u32;
    let params = size_params(context, "elementwise_mul params", size);
    run_compute(
        context,
        "elementwise_mul",
        include_str!("shaders/elementwise_mul.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(x.inner()),
            Binding::ReadOnly(y.inner()),
            Binding::ReadWrite(out.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// `out = 1 / x` elementwise, with near-zero inputs mapping to zero.
pub(crate) fn invert_elements(
    context: &Arc<GpuContext>,
    x: &GpuVector,
    out: &mut GpuVector,
) -> Result<()> {
    ensure_resident(context, &[x, &*out])?;
    ensure_same_size("invert_elements", x, out)?;
    let size = x.size() as u32;
    let params = size_params(context, "invert_elements params", size);
    run_compute(
        context,
        "invert_elements",
        include_str!("shaders/invert_elements.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(x.inner()),
            Binding::ReadWrite(out.inner()),
        ],
        workgroups_for(size, ELEMENTWISE_WORKGROUP),
    );
    Ok(())
}

/// Inner product `x^T * y`, reduced on the device and read back as one
/// scalar.
pub(crate) async fn dot(context: &Arc<GpuContext>, x: &GpuVector, y: &GpuVector) -> Result<f64> {
    ensure_resident(context, &[x, y])?;
    ensure_same_size("dot", x, y)?;
    let size = x.size() as u32;
    let num_workgroups = workgroups_for(size, ELEMENTWISE_WORKGROUP);

    let partials = context.create_empty_buffer(
        "dot partials",
        u64::from(num_workgroups) * std::mem::size_of::<f64>() as u64,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    );
    let params_pass1 = size_params(context, "dot pass1 params", size);
    run_compute(
        context,
        "dot pass1",
        include_str!("shaders/dot_pass1.wgsl"),
        "main",
        &[
            Binding::Uniform(&params_pass1),
            Binding::ReadOnly(x.inner()),
            Binding::ReadOnly(y.inner()),
            Binding::ReadWrite(&partials),
        ],
        num_workgroups,
    );

    let result = context.create_empty_buffer(
        "dot result",
        std::mem::size_of::<f64>() as u64,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    );
    let params_pass2 = size_params(context, "dot pass2 params", num_workgroups);
    run_compute(
        context,
        "dot pass2",
        include_str!("shaders/dot_pass2.wgsl"),
        "main",
        &[
            Binding::Uniform(&params_pass2),
            Binding::ReadOnly(&partials),
            Binding::ReadWrite(&result),
        ],
        1,
    );

    let value = context.read_buffer_to_cpu::<f64>(&result, 1).await?;
    value
        .first()
        .copied()
        .ok_or_else(|| SparlaCoreError::Internal("dot readback returned no data".to_string()))
}

fn check_spmv_shapes(rows: usize, cols: usize, x: &GpuVector, y: &GpuVector) -> Result<()> {
    if cols != x.size() {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix columns ({}) do not match x size ({})",
            cols,
            x.size()
        )));
    }
    if rows != y.size() {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "matrix rows ({}) do not match y size ({})",
            rows,
            y.size()
        )));
    }
    Ok(())
}

/// `y = A * x` for a device CSR matrix. The vector kernel assigns one
/// workgroup per row and is limited to the per-dimension dispatch bound.
pub(crate) fn spmv_csr(
    matrix: &CsrMatrixGpu,
    x: &GpuVector,
    y: &mut GpuVector,
    vector_kernel: bool,
) -> Result<()> {
    let context = &matrix.context;
    ensure_resident(context, &[x, &*y])?;
    check_spmv_shapes(matrix.rows(), matrix.cols(), x, y)?;

    let params_data = SpmvParams {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        nnz: matrix.nnz() as u32,
        flag: 0,
    };
    let params = context.create_gpu_buffer_with_data(
        "spmv csr params",
        bytemuck::bytes_of(&params_data),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    );
    let bindings = [
        Binding::Uniform(&params),
        Binding::ReadOnly(matrix.row_offsets_buffer()),
        Binding::ReadOnly(matrix.column_indices_buffer()),
        Binding::ReadOnly(matrix.values_buffer()),
        Binding::ReadOnly(x.inner()),
        Binding::ReadWrite(y.inner()),
    ];
    if vector_kernel {
        let rows = matrix.rows() as u32;
        let limit = context.device.limits().max_compute_workgroups_per_dimension;
        if rows > limit {
            return Err(SparlaCoreError::UnsupportedOperation(format!(
                "vector SpMV dispatches one workgroup per row; {} rows exceed the device limit of {}",
                rows, limit
            )));
        }
        run_compute(
            context,
            "spmv csr vector",
            include_str!("shaders/spmv_csr.wgsl"),
            "spmv_vector",
            &bindings,
            rows.max(1),
        );
    } else {
        run_compute(
            context,
            "spmv csr scalar",
            include_str!("shaders/spmv_csr.wgsl"),
            "spmv_scalar",
            &bindings,
            workgroups_for(matrix.rows() as u32, ROW_WORKGROUP),
        );
    }
    Ok(())
}

/// `y = A * x` (or `y += A * x` when `accumulate`) for a device COO
/// matrix; rows are located by binary search over the sorted row indices.
pub(crate) fn spmv_coo(
    matrix: &CooMatrixGpu,
    x: &GpuVector,
    y: &mut GpuVector,
    accumulate: bool,
) -> Result<()> {
    let context = &matrix.context;
    ensure_resident(context, &[x, &*y])?;
    check_spmv_shapes(matrix.rows(), matrix.cols(), x, y)?;

    let params_data = SpmvParams {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        nnz: matrix.nnz() as u32,
        flag: u32::from(accumulate),
    };
    let params = context.create_gpu_buffer_with_data(
        "spmv coo params",
        bytemuck::bytes_of(&params_data),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    );
    run_compute(
        context,
        "spmv coo",
        include_str!("shaders/spmv_coo.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(matrix.row_indices_buffer()),
            Binding::ReadOnly(matrix.column_indices_buffer()),
            Binding::ReadOnly(matrix.values_buffer()),
            Binding::ReadOnly(x.inner()),
            Binding::ReadWrite(y.inner()),
        ],
        workgroups_for(matrix.rows() as u32, ROW_WORKGROUP),
    );
    Ok(())
}

/// `y = A * x` for a device DIA matrix.
pub(crate) fn spmv_dia(matrix: &DiaMatrixGpu, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
    let context = &matrix.context;
    ensure_resident(context, &[x, &*y])?;
    check_spmv_shapes(matrix.rows(), matrix.cols(), x, y)?;

    let params_data = SlottedParams {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        lanes: matrix.num_diagonals() as u32,
        stride: matrix.stride() as u32,
    };
    let params = context.create_gpu_buffer_with_data(
        "spmv dia params",
        bytemuck::bytes_of(&params_data),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    );
    run_compute(
        context,
        "spmv dia",
        include_str!("shaders/spmv_dia.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(matrix.diagonal_offsets_buffer()),
            Binding::ReadOnly(matrix.values_buffer()),
            Binding::ReadOnly(x.inner()),
            Binding::ReadWrite(y.inner()),
        ],
        workgroups_for(matrix.rows() as u32, ROW_WORKGROUP),
    );
    Ok(())
}

/// `y = A * x` for a device ELL matrix.
pub(crate) fn spmv_ell(matrix: &EllMatrixGpu, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
    let context = &matrix.context;
    ensure_resident(context, &[x, &*y])?;
    check_spmv_shapes(matrix.rows(), matrix.cols(), x, y)?;

    let params_data = SlottedParams {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        lanes: matrix.cols_per_row() as u32,
        stride: matrix.stride() as u32,
    };
    let params = context.create_gpu_buffer_with_data(
        "spmv ell params",
        bytemuck::bytes_of(&params_data),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    );
    run_compute(
        context,
        "spmv ell",
        include_str!("shaders/spmv_ell.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(matrix.column_indices_buffer()),
            Binding::ReadOnly(matrix.values_buffer()),
            Binding::ReadOnly(x.inner()),
            Binding::ReadWrite(y.inner()),
        ],
        workgroups_for(matrix.rows() as u32, ROW_WORKGROUP),
    );
    Ok(())
}

/// Writes the main diagonal of a device CSR matrix into `out`.
pub(crate) fn extract_diagonal(
    matrix: &CsrMatrixGpu,
    out: &mut GpuVector,
) -> Result<()> {
    let context = &matrix.context;
    ensure_resident(context, &[&*out])?;
    if out.size() != matrix.rows() {
        return Err(SparlaCoreError::ShapeMismatch(format!(
            "output size ({}) must match matrix rows ({})",
            out.size(),
            matrix.rows()
        )));
    }

    let params_data = SpmvParams {
        rows: matrix.rows() as u32,
        cols: matrix.cols() as u32,
        nnz: matrix.nnz() as u32,
        flag: 0,
    };
    let params = context.create_gpu_buffer_with_data(
        "extract_diagonal params",
        bytemuck::bytes_of(&params_data),
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    );
    run_compute(
        context,
        "extract_diagonal",
        include_str!("shaders/extract_diagonal.wgsl"),
        "main",
        &[
            Binding::Uniform(&params),
            Binding::ReadOnly(matrix.row_offsets_buffer()),
            Binding::ReadOnly(matrix.column_indices_buffer()),
            Binding::ReadOnly(matrix.values_buffer()),
            Binding::ReadWrite(out.inner()),
        ],
        workgroups_for(matrix.rows() as u32, ROW_WORKGROUP),
    );
    Ok(())
}
