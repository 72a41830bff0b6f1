use tokio::net::TcpStream;

use crate::connect_options::BrokerUrl;
use crate::error::Result;

pub async fn connect(url: &BrokerUrl) -> Result<TcpStream> {
    let stream = TcpStream::connect((url.host.as_str(), url.port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
