// Render pass, framebuffers and the one graphics pipeline
//
// The triangle needs a single color pass and a pipeline with no vertex
// input: positions and colors are indexed from constants in the vertex
// shader by gl_VertexIndex.

use anyhow::{Context, Result};
use ash::vk;
use super::shader::{create_shader_module, ShaderCode};
use super::{VkFailure, VulkanDevice};

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Create a render pass with one color attachment that ends up presentable
pub fn create_render_pass(device: &VulkanDevice, format: vk::Format) -> Result<vk::RenderPass> {
    // Cleared on load, kept for present; stencil is unused
    let attachments = [vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .build()];

    // Don't write the attachment before acquire has handed the image over
    let dependencies = [vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }];

    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.device.create_render_pass(&info, None) }.context(VkFailure::CreateRenderPass)
}

/// Create one framebuffer per swapchain image view
pub fn create_framebuffers(
    device: &VulkanDevice,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for view in image_views {
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(std::slice::from_ref(view))
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.device.create_framebuffer(&info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for framebuffer in framebuffers {
                    unsafe { device.device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(e).context(VkFailure::CreateFramebuffer);
            }
        }
    }

    Ok(framebuffers)
}

/// Create the triangle pipeline and its (empty) layout
///
/// Shader modules only live for the duration of this call.
pub fn create_graphics_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    shaders: &ShaderCode,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let vert_shader = create_shader_module(device, &shaders.vertex)?;
    let frag_shader = match create_shader_module(device, &shaders.fragment) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.device.destroy_shader_module(vert_shader, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(device, render_pass, extent, vert_shader, frag_shader);

    unsafe {
        device.device.destroy_shader_module(vert_shader, None);
        device.device.destroy_shader_module(frag_shader, None);
    }

    result
}

fn shader_stage(
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
) -> vk::PipelineShaderStageCreateInfo {
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(stage)
        .module(module)
        .name(ENTRY_POINT)
        .build()
}

/// Viewport and scissor covering the whole extent. They are baked into the
/// pipeline, which is why it is rebuilt alongside the swapchain.
fn full_extent(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    };
    (viewport, scissor)
}

fn build_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let stages = [
        shader_stage(vk::ShaderStageFlags::VERTEX, vert_shader),
        shader_stage(vk::ShaderStageFlags::FRAGMENT, frag_shader),
    ];

    // No vertex buffers at all
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };

    let (viewport, scissor) = full_extent(extent);
    let viewports = [viewport];
    let scissors = [scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(&viewports)
        .scissors(&scissors);

    // Triangle vertices are listed clockwise in the vertex shader
    let rasterization = vk::PipelineRasterizationStateCreateInfo {
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };

    let multisample = vk::PipelineMultisampleStateCreateInfo {
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        min_sample_shading: 1.0,
        ..Default::default()
    };

    // Opaque
    let blend_attachments = [vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    }];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op(vk::LogicOp::COPY)
        .attachments(&blend_attachments);

    let layout_info = vk::PipelineLayoutCreateInfo::default();
    let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
        .context(VkFailure::CreatePipelineLayout)?;

    let create_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .base_pipeline_index(-1)
        .build();

    let created = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
    };

    match created.map(|pipelines| pipelines.first().copied()) {
        Ok(Some(pipeline)) => Ok((pipeline, layout)),
        Ok(None) => {
            unsafe { device.device.destroy_pipeline_layout(layout, None) };
            Err(anyhow::anyhow!("driver returned no pipeline"))
                .context(VkFailure::CreateGraphicsPipeline)
        }
        Err((_, e)) => {
            unsafe { device.device.destroy_pipeline_layout(layout, None) };
            Err(e).context(VkFailure::CreateGraphicsPipeline)
        }
    }
}
