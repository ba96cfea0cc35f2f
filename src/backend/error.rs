// Failure tags for native calls
//
// Every Vulkan (or window/file) call that can fail is wrapped with one of
// these via `anyhow::Context`, so the fatal error names the call that failed.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VkFailure {
    LoadLibrary,
    CreateInstance,
    InstanceExtensionNotFound,
    ValidationLayerNotFound,
    SetupDebugMessenger,
    CreateSurface,
    QuerySurface,
    PhysicalDeviceNotFound,
    PhysicalDeviceNotSuitable,
    CreateLogicalDevice,
    CreateSwapchain,
    CreateImageView,
    CreateRenderPass,
    CreatePipelineLayout,
    CreateGraphicsPipeline,
    CreateShaderModule,
    CreateFramebuffer,
    CreateCommandPool,
    AllocateCommandBuffers,
    BeginCommandBuffer,
    EndCommandBuffer,
    CreateSyncObjects,
    AcquireImage,
    QueueSubmit,
    QueuePresent,
    WaitForFences,
    ResetFences,
    DeviceWaitIdle,
    CreateWindow,
    FileNotFound,
}

impl VkFailure {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::LoadLibrary => "VULKAN_LOAD_LIBRARY_FAILURE",
            Self::CreateInstance => "VULKAN_CREATE_INSTANCE_FAILURE",
            Self::InstanceExtensionNotFound => "VULKAN_INSTANCE_EXTENSION_NOT_FOUND",
            Self::ValidationLayerNotFound => "VULKAN_VALIDATION_LAYER_NOT_FOUND",
            Self::SetupDebugMessenger => "VULKAN_SETUP_DEBUG_MESSAGER_FAILURE",
            Self::CreateSurface => "VULKAN_CREATE_SURFACE_FAILURE",
            Self::QuerySurface => "VULKAN_QUERY_SURFACE_FAILURE",
            Self::PhysicalDeviceNotFound => "VULKAN_PHYSICAL_DEVICE_NOT_FOUND",
            Self::PhysicalDeviceNotSuitable => "VULKAN_PHYSICAL_DEVICE_NOT_SUITABLE",
            Self::CreateLogicalDevice => "VULKAN_CREATE_LOGICAL_DEVICE_FAILURE",
            Self::CreateSwapchain => "VULKAN_CREATE_SWAPCHAIN_FAILURE",
            Self::CreateImageView => "VULKAN_CREATE_IMAGE_VIEW_FAILURE",
            Self::CreateRenderPass => "VULKAN_CREATE_RENDER_PASS_FAILURE",
            Self::CreatePipelineLayout => "VULKAN_CREATE_PIPELINE_LAYOUT_FAILURE",
            Self::CreateGraphicsPipeline => "VULKAN_CREATE_GRAPHICS_PIPELINE_FAILURE",
            Self::CreateShaderModule => "VULKAN_CREATE_SHADER_MODULE_FAILURE",
            Self::CreateFramebuffer => "VULKAN_CREATE_FRAMEBUFFER_FAILURE",
            Self::CreateCommandPool => "VULKAN_CREATE_COMMAND_POOL_FAILURE",
            Self::AllocateCommandBuffers => "VULKAN_ALLOCATE_COMMAND_BUFFERS_FAILURE",
            Self::BeginCommandBuffer => "VULKAN_BEGIN_COMMAND_BUFFER_FAILURE",
            Self::EndCommandBuffer => "VULKAN_END_COMMAND_BUFFER_FAILURE",
            Self::CreateSyncObjects => "VULKAN_CREATE_SYNCHRONIZATION_OBJECTS_FAILURE",
            Self::AcquireImage => "VULKAN_ACQUIRE_IMAGE_FAILURE",
            Self::QueueSubmit => "VULKAN_QUEUE_SUBMIT_FAILURE",
            Self::QueuePresent => "VULKAN_QUEUE_PRESENT_FAILURE",
            Self::WaitForFences => "VULKAN_WAIT_FOR_FENCES_FAILURE",
            Self::ResetFences => "VULKAN_RESET_FENCES_FAILURE",
            Self::DeviceWaitIdle => "VULKAN_DEVICE_WAIT_IDLE_FAILURE",
            Self::CreateWindow => "WINDOW_CREATE_FAILURE",
            Self::FileNotFound => "FILE_NOT_FOUND",
        }
    }
}

impl fmt::Display for VkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::error::Error for VkFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use ash::vk;

    #[test]
    fn tag_is_outermost_message() {
        let result: Result<(), vk::Result> = Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        let err = result.context(VkFailure::CreateInstance).unwrap_err();

        assert_eq!(err.to_string(), "VULKAN_CREATE_INSTANCE_FAILURE");
        assert_eq!(err.downcast_ref::<VkFailure>(), Some(&VkFailure::CreateInstance));
        // The alternate form appends the readable description of the result code
        let chain = format!("{err:#}");
        assert!(chain.starts_with("VULKAN_CREATE_INSTANCE_FAILURE: "));
        assert!(chain.contains(&vk::Result::ERROR_INITIALIZATION_FAILED.to_string()));
    }

    #[test]
    fn option_context_carries_tag() {
        let missing: Option<u32> = None;
        let err = missing.context(VkFailure::PhysicalDeviceNotSuitable).unwrap_err();

        assert_eq!(err.downcast_ref::<VkFailure>(), Some(&VkFailure::PhysicalDeviceNotSuitable));
    }

    #[test]
    fn bare_tag_downcasts() {
        let err: anyhow::Error = VkFailure::PhysicalDeviceNotFound.into();

        assert_eq!(err.to_string(), "VULKAN_PHYSICAL_DEVICE_NOT_FOUND");
        assert!(err.is::<VkFailure>());
    }

    #[test]
    fn tags_are_fixed_strings() {
        let expected = [
            (VkFailure::LoadLibrary, "VULKAN_LOAD_LIBRARY_FAILURE"),
            (VkFailure::CreateInstance, "VULKAN_CREATE_INSTANCE_FAILURE"),
            (VkFailure::InstanceExtensionNotFound, "VULKAN_INSTANCE_EXTENSION_NOT_FOUND"),
            (VkFailure::ValidationLayerNotFound, "VULKAN_VALIDATION_LAYER_NOT_FOUND"),
            // Spelled this way in every log and script that greps for it
            (VkFailure::SetupDebugMessenger, "VULKAN_SETUP_DEBUG_MESSAGER_FAILURE"),
            (VkFailure::CreateSurface, "VULKAN_CREATE_SURFACE_FAILURE"),
            (VkFailure::QuerySurface, "VULKAN_QUERY_SURFACE_FAILURE"),
            (VkFailure::PhysicalDeviceNotFound, "VULKAN_PHYSICAL_DEVICE_NOT_FOUND"),
            (VkFailure::PhysicalDeviceNotSuitable, "VULKAN_PHYSICAL_DEVICE_NOT_SUITABLE"),
            (VkFailure::CreateLogicalDevice, "VULKAN_CREATE_LOGICAL_DEVICE_FAILURE"),
            (VkFailure::CreateSwapchain, "VULKAN_CREATE_SWAPCHAIN_FAILURE"),
            (VkFailure::CreateImageView, "VULKAN_CREATE_IMAGE_VIEW_FAILURE"),
            (VkFailure::CreateRenderPass, "VULKAN_CREATE_RENDER_PASS_FAILURE"),
            (VkFailure::CreatePipelineLayout, "VULKAN_CREATE_PIPELINE_LAYOUT_FAILURE"),
            (VkFailure::CreateGraphicsPipeline, "VULKAN_CREATE_GRAPHICS_PIPELINE_FAILURE"),
            (VkFailure::CreateShaderModule, "VULKAN_CREATE_SHADER_MODULE_FAILURE"),
            (VkFailure::CreateFramebuffer, "VULKAN_CREATE_FRAMEBUFFER_FAILURE"),
            (VkFailure::CreateCommandPool, "VULKAN_CREATE_COMMAND_POOL_FAILURE"),
            (VkFailure::AllocateCommandBuffers, "VULKAN_ALLOCATE_COMMAND_BUFFERS_FAILURE"),
            (VkFailure::BeginCommandBuffer, "VULKAN_BEGIN_COMMAND_BUFFER_FAILURE"),
            (VkFailure::EndCommandBuffer, "VULKAN_END_COMMAND_BUFFER_FAILURE"),
            (VkFailure::CreateSyncObjects, "VULKAN_CREATE_SYNCHRONIZATION_OBJECTS_FAILURE"),
            (VkFailure::AcquireImage, "VULKAN_ACQUIRE_IMAGE_FAILURE"),
            (VkFailure::QueueSubmit, "VULKAN_QUEUE_SUBMIT_FAILURE"),
            (VkFailure::QueuePresent, "VULKAN_QUEUE_PRESENT_FAILURE"),
            (VkFailure::WaitForFences, "VULKAN_WAIT_FOR_FENCES_FAILURE"),
            (VkFailure::ResetFences, "VULKAN_RESET_FENCES_FAILURE"),
            (VkFailure::DeviceWaitIdle, "VULKAN_DEVICE_WAIT_IDLE_FAILURE"),
            (VkFailure::CreateWindow, "WINDOW_CREATE_FAILURE"),
            (VkFailure::FileNotFound, "FILE_NOT_FOUND"),
        ];

        for (failure, tag) in expected {
            assert_eq!(failure.tag(), tag);
            assert_eq!(failure.to_string(), tag);
        }
    }
}
