// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one file per kind of Vulkan object

pub mod commands;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use error::VkFailure;
pub use swapchain::Swapchain;
